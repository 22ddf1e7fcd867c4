use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// AppConfig — file-based config loader (antecedentes-scout.json) with env-var
// fallback, resolved once at startup and passed into the orchestrator.
// ---------------------------------------------------------------------------

/// Fixed entry point of the WebJudicial consultation service.
pub const DEFAULT_SERVICE_URL: &str = "https://antecedentes.policia.gov.co:7005/WebJudicial/";

/// Marker left in place of a real 2Captcha key by the sample config.
/// A credential containing it is treated as unconfigured.
const CAPTCHA_KEY_PLACEHOLDER: &str = "TU_API_KEY";

pub const ENV_CONFIG_PATH: &str = "ANTECEDENTES_SCOUT_CONFIG";
pub const ENV_CAPTCHA_API_KEY: &str = "API_KEY_2CAPTCHA";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Raw shape of `antecedentes-scout.json`. Every field is optional; missing
/// fields fall back to env vars and then to the built-in defaults.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct FileConfig {
    pub service_url: Option<String>,
    /// 2Captcha API key. Never logged.
    pub captcha_api_key: Option<String>,
    /// Shared bound for every element-condition wait, in seconds.
    pub wait_timeout_secs: Option<u64>,
    /// Flat wait for the results page to render after submission.
    pub settle_secs: Option<u64>,
    /// Pause after accepting the terms so the page scripts can react.
    pub terms_pause_ms: Option<u64>,
    /// Pause between token injection and clicking the consult control.
    pub post_solve_pause_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub results_dir: Option<PathBuf>,
    pub errors_dir: Option<PathBuf>,
    pub chrome_executable: Option<String>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
}

/// Fully-resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub service_url: String,
    /// Usable 2Captcha credential, `None` when unset or still the placeholder.
    pub captcha_api_key: Option<String>,
    pub wait_timeout_secs: u64,
    pub settle_secs: u64,
    pub terms_pause_ms: u64,
    pub post_solve_pause_ms: u64,
    pub max_attempts: u32,
    pub results_dir: PathBuf,
    pub errors_dir: PathBuf,
    pub chrome_executable: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            captcha_api_key: None,
            wait_timeout_secs: 20,
            settle_secs: 10,
            terms_pause_ms: 1500,
            post_solve_pause_ms: 2000,
            max_attempts: 2,
            results_dir: PathBuf::from("antecedentes"),
            errors_dir: PathBuf::from("errors"),
            chrome_executable: None,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

impl AppConfig {
    /// Load `antecedentes-scout.json` (if present), apply env-var fallbacks,
    /// and resolve the final configuration.
    pub fn load() -> Self {
        let mut fc = load_file_config();
        if fc.captcha_api_key.is_none() {
            fc.captcha_api_key = std::env::var(ENV_CAPTCHA_API_KEY).ok();
        }
        if fc.chrome_executable.is_none() {
            fc.chrome_executable = std::env::var(ENV_CHROME_EXECUTABLE).ok();
        }
        Self::from_file_config(fc)
    }

    /// Resolve a raw file config against the defaults. Pure — no env access.
    pub fn from_file_config(fc: FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            service_url: fc
                .service_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(defaults.service_url),
            captcha_api_key: fc.captcha_api_key.as_deref().and_then(usable_captcha_key),
            wait_timeout_secs: fc.wait_timeout_secs.unwrap_or(defaults.wait_timeout_secs),
            settle_secs: fc.settle_secs.unwrap_or(defaults.settle_secs),
            terms_pause_ms: fc.terms_pause_ms.unwrap_or(defaults.terms_pause_ms),
            post_solve_pause_ms: fc
                .post_solve_pause_ms
                .unwrap_or(defaults.post_solve_pause_ms),
            max_attempts: fc.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            results_dir: fc.results_dir.unwrap_or(defaults.results_dir),
            errors_dir: fc.errors_dir.unwrap_or(defaults.errors_dir),
            chrome_executable: fc
                .chrome_executable
                .filter(|p| Path::new(p.trim()).exists()),
            window_width: fc.window_width.unwrap_or(defaults.window_width),
            window_height: fc.window_height.unwrap_or(defaults.window_height),
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn terms_pause(&self) -> Duration {
        Duration::from_millis(self.terms_pause_ms)
    }

    pub fn post_solve_pause(&self) -> Duration {
        Duration::from_millis(self.post_solve_pause_ms)
    }
}

/// Returns the trimmed credential, or `None` when it is empty or still the
/// placeholder shipped with the sample config.
pub fn usable_captcha_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key.contains(CAPTCHA_KEY_PLACEHOLDER) {
        return None;
    }
    Some(key.to_string())
}

/// Search order (first found wins):
/// 1. `ANTECEDENTES_SCOUT_CONFIG` env var path
/// 2. `./antecedentes-scout.json`
/// 3. `../antecedentes-scout.json`
///
/// Missing file → `FileConfig::default()` (silent, env-var fallbacks apply).
/// Parse error → log a warning, return `FileConfig::default()`.
fn load_file_config() -> FileConfig {
    let mut candidates = vec![
        PathBuf::from("antecedentes-scout.json"),
        PathBuf::from("../antecedentes-scout.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<FileConfig>(&contents) {
                Ok(fc) => {
                    tracing::info!("antecedentes-scout.json loaded from {}", path.display());
                    return fc;
                }
                Err(e) => {
                    tracing::warn!(
                        "antecedentes-scout.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return FileConfig::default();
                }
            },
            Err(_) => continue, // not found at this path — try next
        }
    }

    FileConfig::default()
}

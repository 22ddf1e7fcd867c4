//! Scripted fakes for the external seams: browser driver, driver factory,
//! captcha resolver, and operator console.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use antecedentes_scout::browser::{Driver, DriverError, DriverFactory, DriverResult};
use antecedentes_scout::captcha::{CaptchaError, CaptchaResolver};
use antecedentes_scout::core::config::AppConfig;
use antecedentes_scout::query::OperatorConsole;

// Initialize logging for tests
pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Per-instance observation counters, shared with the test via `Arc`.
#[derive(Default)]
pub struct FakeStats {
    pub close_calls: AtomicUsize,
    pub content_calls: AtomicUsize,
    pub screenshot_calls: AtomicUsize,
    pub clicks: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<(String, String)>>,
    pub scripts: Mutex<Vec<String>>,
}

impl FakeStats {
    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn screenshots(&self) -> usize {
        self.screenshot_calls.load(Ordering::SeqCst)
    }

    pub fn clicked(&self, selector: &str) -> bool {
        self.clicks.lock().unwrap().iter().any(|s| s == selector)
    }

    pub fn injected_script_containing(&self, needle: &str) -> bool {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.contains(needle))
    }
}

/// Scripted behavior of one fake browser session.
#[derive(Clone)]
pub struct FakeBehavior {
    pub alive: bool,
    pub submit_enabled: bool,
    pub screenshot_fails: bool,
    pub pdf_bytes: Option<Vec<u8>>,
    /// `(selector, attribute) -> value`; anything else times out.
    pub attributes: Vec<((&'static str, &'static str), &'static str)>,
    pub page_markup: String,
    /// Clicking this selector fails with an unclassifiable protocol error.
    pub explode_on_click: Option<&'static str>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            alive: true,
            submit_enabled: true,
            screenshot_fails: false,
            pdf_bytes: Some(b"%PDF-1.4 fake results page".to_vec()),
            attributes: Vec::new(),
            page_markup: "<html><body></body></html>".to_string(),
            explode_on_click: None,
        }
    }
}

pub struct FakeDriver {
    behavior: FakeBehavior,
    stats: Arc<FakeStats>,
}

pub fn make_driver(behavior: FakeBehavior) -> (FakeDriver, Arc<FakeStats>) {
    let stats = Arc::new(FakeStats::default());
    (
        FakeDriver {
            behavior,
            stats: Arc::clone(&stats),
        },
        stats,
    )
}

#[async_trait]
impl Driver for FakeDriver {
    async fn is_alive(&self) -> bool {
        self.behavior.alive
    }

    async fn goto(&self, _url: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok("https://antecedentes.policia.gov.co:7005/WebJudicial/".to_string())
    }

    async fn wait_gone(&self, _selector: &str, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn wait_clickable(&self, _selector: &str, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn wait_visible(&self, _selector: &str, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn wait_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> DriverResult<Option<String>> {
        for ((sel, attr), value) in &self.behavior.attributes {
            if *sel == selector && *attr == attribute {
                return Ok(Some(value.to_string()));
            }
        }
        Err(DriverError::Timeout {
            selector: selector.to_string(),
            waited_ms: timeout.as_millis() as u64,
        })
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        if self.behavior.explode_on_click == Some(selector) {
            return Err(DriverError::Protocol("deliberate fault".to_string()));
        }
        self.stats.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn is_enabled(&self, _selector: &str) -> DriverResult<bool> {
        Ok(self.behavior.submit_enabled)
    }

    async fn type_into(&self, selector: &str, text: &str) -> DriverResult<()> {
        self.stats
            .typed
            .lock()
            .unwrap()
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn execute_js(&self, script: &str) -> DriverResult<Value> {
        self.stats.scripts.lock().unwrap().push(script.to_string());
        Ok(Value::Null)
    }

    async fn page_source(&self) -> DriverResult<String> {
        self.stats.content_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.behavior.page_markup.clone())
    }

    async fn print_pdf(&self) -> DriverResult<Vec<u8>> {
        match &self.behavior.pdf_bytes {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(DriverError::Protocol("print refused".to_string())),
        }
    }

    async fn screenshot_png(&self) -> DriverResult<Vec<u8>> {
        self.stats.screenshot_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.screenshot_fails {
            return Err(DriverError::Protocol("no screenshot".to_string()));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.stats.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out pre-scripted drivers in order; errors once the queue is empty.
pub struct FakeFactory {
    queue: Mutex<VecDeque<FakeDriver>>,
    pub created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(drivers: Vec<FakeDriver>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(drivers.into()),
            created: AtomicUsize::new(0),
        })
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for FakeFactory {
    async fn create(&self) -> DriverResult<Box<dyn Driver>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .map(|d| Box::new(d) as Box<dyn Driver>)
            .ok_or_else(|| DriverError::Launch("fake factory exhausted".to_string()))
    }
}

pub struct FakeResolver {
    pub response: Value,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CaptchaResolver for FakeResolver {
    async fn solve(&self, _site_key: &str, _page_url: &str) -> Result<Value, CaptchaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

pub struct FakeConsole {
    pub fail: bool,
    pub confirmations: AtomicUsize,
}

impl FakeConsole {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            confirmations: AtomicUsize::new(0),
        })
    }

    pub fn confirmed(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperatorConsole for FakeConsole {
    async fn wait_for_operator(&self, _instructions: &str) -> std::io::Result<()> {
        if self.fail {
            return Err(std::io::Error::other("no operator attached"));
        }
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Orchestrator config with zeroed pauses and scratch output dirs.
pub fn test_config(test_name: &str) -> AppConfig {
    let scratch = std::env::temp_dir().join(format!(
        "antecedentes-scout-test-{}-{}",
        std::process::id(),
        test_name
    ));
    let _ = std::fs::remove_dir_all(&scratch);
    AppConfig {
        wait_timeout_secs: 1,
        settle_secs: 0,
        terms_pause_ms: 0,
        post_solve_pause_ms: 0,
        results_dir: scratch.join("antecedentes"),
        errors_dir: scratch.join("errors"),
        ..AppConfig::default()
    }
}

pub fn results_path(cfg: &AppConfig, cedula: &str) -> PathBuf {
    cfg.results_dir.join(format!("antecedentes_{cedula}.pdf"))
}

pub fn screenshot_path(cfg: &AppConfig, cedula: &str, attempt: u32) -> PathBuf {
    cfg.errors_dir
        .join(format!("error_{cedula}_attempt_{attempt}.png"))
}

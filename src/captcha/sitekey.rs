//! Site-key discovery for the reCAPTCHA widget.
//!
//! An ordered list of named DOM strategies, tried first to last with the same
//! bounded wait each; a strategy that times out or finds nothing advances to
//! the next one. When every DOM strategy misses, a pure scan over the
//! rendered markup is the last resort. First success wins.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{Driver, DriverError};
use crate::captcha::CaptchaError;

/// One DOM heuristic: a selector plus the attribute carrying the key, either
/// directly or inside a `src` URL's `k=` query parameter.
pub struct Strategy {
    pub name: &'static str,
    pub selector: &'static str,
    pub attribute: &'static str,
    pub from_src: bool,
}

pub const STRATEGIES: [Strategy; 4] = [
    Strategy {
        name: "sitekey-attribute",
        selector: "[data-sitekey]",
        attribute: "data-sitekey",
        from_src: false,
    },
    Strategy {
        name: "captcha-iframe",
        selector: "iframe[src*=\"recaptcha\"]",
        attribute: "src",
        from_src: true,
    },
    Strategy {
        name: "captcha-container",
        selector: ".g-recaptcha",
        attribute: "data-sitekey",
        from_src: false,
    },
    Strategy {
        name: "captcha-script",
        selector: "script[src*=\"recaptcha\"]",
        attribute: "src",
        from_src: true,
    },
];

/// Try every strategy in order against the live page, then the markup scan.
pub async fn extract(driver: &dyn Driver, timeout: Duration) -> Result<String, CaptchaError> {
    for strategy in &STRATEGIES {
        debug!(
            "sitekey strategy {}: probing {}",
            strategy.name, strategy.selector
        );
        match driver
            .wait_attribute(strategy.selector, strategy.attribute, timeout)
            .await
        {
            Ok(Some(raw)) => {
                let found = if strategy.from_src {
                    sitekey_from_src(&raw)
                } else {
                    Some(raw).filter(|v| !v.is_empty())
                };
                if let Some(key) = found {
                    info!("sitekey found via {}: {}", strategy.name, key);
                    return Ok(key);
                }
            }
            Ok(None) => {}
            Err(DriverError::Timeout { .. }) | Err(DriverError::NotFound(_)) => {
                warn!("sitekey strategy {} found nothing", strategy.name);
            }
            Err(e) => return Err(e.into()),
        }
    }

    debug!("sitekey DOM strategies exhausted, scanning page markup");
    let markup = driver.page_source().await?;
    scan_markup(&markup).ok_or(CaptchaError::SitekeyNotFound)
}

/// Extract the `k=` query parameter from a widget/script `src` URL — up to
/// the next `&`. Falls back to a plain split for relative values.
pub fn sitekey_from_src(src: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(src) {
        return parsed
            .query_pairs()
            .find(|(name, _)| name == "k")
            .map(|(_, value)| value.into_owned())
            .filter(|v| !v.is_empty());
    }
    let rest = src.split_once("k=")?.1;
    let token = rest.split('&').next().unwrap_or(rest);
    (!token.is_empty()).then(|| token.to_string())
}

static MARKUP_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn markup_patterns() -> &'static [Regex] {
    MARKUP_PATTERNS.get_or_init(|| {
        [
            r#"data-sitekey=["']([^"']+)["']"#,
            r#"sitekey["']?\s*:\s*["']([^"']+)["']"#,
            r"k=([a-zA-Z0-9_-]+)",
            r#"recaptcha.*?["']([a-zA-Z0-9_-]{40})["']"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid sitekey pattern"))
        .collect()
    })
}

/// Scan the rendered markup for a site key. Patterns are tried in order and
/// the first match of the first matching pattern wins.
pub fn scan_markup(markup: &str) -> Option<String> {
    markup_patterns().iter().find_map(|pattern| {
        pattern
            .captures(markup)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

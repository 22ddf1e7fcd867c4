//! The `Driver` seam over a controlled browser session.
//!
//! The orchestrator only ever talks to `dyn Driver`, so the whole flow is
//! testable against a scripted fake. `CdpDriver` is the production
//! implementation over a `chromiumoxide` browser: one browser process, one
//! page, a detached CDP event-handler task, and 250 ms polling waits bounded
//! by a deadline.
//!
//! Error classification happens here, at the point of failure: when a CDP
//! call errors, a short liveness probe decides between `WindowClosed` (the
//! session is gone) and `Protocol` (the session answered but the call
//! failed). Element-missing conditions are detected up front via
//! `querySelector` so they never masquerade as protocol noise.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::manager;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser window or session lost: {0}")]
    WindowClosed(String),

    #[error("timed out after {waited_ms}ms waiting on {selector}")]
    Timeout { selector: String, waited_ms: u64 },

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// One controlled browser session. Exclusively owned by the orchestrator for
/// the duration of an attempt and closed before the attempt concludes.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Cheap probe of the session. Any failure means "not alive".
    async fn is_alive(&self) -> bool;

    async fn goto(&self, url: &str) -> DriverResult<()>;
    async fn current_url(&self) -> DriverResult<String>;

    /// Wait until no element matches `selector` (overlay dismissal).
    async fn wait_gone(&self, selector: &str, timeout: Duration) -> DriverResult<()>;
    /// Wait until the element exists, is displayed, and is not disabled.
    async fn wait_clickable(&self, selector: &str, timeout: Duration) -> DriverResult<()>;
    /// Wait until the element exists and is displayed.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> DriverResult<()>;
    /// Wait until the element exists, then read one of its attributes.
    async fn wait_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> DriverResult<Option<String>>;

    async fn click(&self, selector: &str) -> DriverResult<()>;
    async fn is_enabled(&self, selector: &str) -> DriverResult<bool>;
    async fn type_into(&self, selector: &str, text: &str) -> DriverResult<()>;

    async fn execute_js(&self, script: &str) -> DriverResult<Value>;
    async fn page_source(&self) -> DriverResult<String>;

    async fn print_pdf(&self) -> DriverResult<Vec<u8>>;
    async fn screenshot_png(&self) -> DriverResult<Vec<u8>>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// Creates fresh driver instances; the orchestrator calls it once per attempt
/// and again mid-attempt when a session goes stale.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self) -> DriverResult<Box<dyn Driver>>;
}

// ── JS condition snippets ────────────────────────────────────────────────────

fn js_quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn exists_js(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_quote(selector))
}

fn gone_js(selector: &str) -> String {
    format!("document.querySelector({}) === null", js_quote(selector))
}

fn clickable_js(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return !!el && !el.disabled && el.getClientRects().length > 0; }})()",
        js_quote(selector)
    )
}

fn visible_js(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return !!el && el.getClientRects().length > 0; }})()",
        js_quote(selector)
    )
}

fn enabled_js(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return el ? !el.disabled : null; }})()",
        js_quote(selector)
    )
}

// ── Production implementation ────────────────────────────────────────────────

pub struct CdpDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl CdpDriver {
    async fn probe_alive(&self) -> bool {
        matches!(
            tokio::time::timeout(LIVENESS_PROBE_TIMEOUT, self.page.evaluate("document.title"))
                .await,
            Ok(Ok(_))
        )
    }

    /// A failed CDP call against a dead session is a lost window; against a
    /// live session it is a protocol-level failure.
    async fn classify(&self, context: &str, e: CdpError) -> DriverError {
        if self.probe_alive().await {
            DriverError::Protocol(format!("{context}: {e}"))
        } else {
            DriverError::WindowClosed(format!("{context}: {e}"))
        }
    }

    async fn eval_value(&self, script: &str) -> DriverResult<Value> {
        match self.page.evaluate(script).await {
            Ok(res) => Ok(res.into_value::<Value>().unwrap_or(Value::Null)),
            Err(e) => Err(self.classify("evaluate", e).await),
        }
    }

    async fn eval_bool(&self, script: &str) -> DriverResult<bool> {
        Ok(self.eval_value(script).await?.as_bool().unwrap_or(false))
    }

    /// Bounded poll of a boolean page condition.
    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
        condition_js: &str,
    ) -> DriverResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.eval_bool(condition_js).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn is_alive(&self) -> bool {
        self.probe_alive().await
    }

    async fn goto(&self, url: &str) -> DriverResult<()> {
        if let Err(e) = self.page.goto(url).await {
            return Err(self.classify("goto", e).await);
        }
        if let Err(e) = self.page.wait_for_navigation().await {
            return Err(self.classify("wait_for_navigation", e).await);
        }
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        match self.page.evaluate("location.href").await {
            Ok(res) => res
                .into_value::<String>()
                .map_err(|e| DriverError::Protocol(format!("location.href: {e}"))),
            Err(e) => Err(self.classify("location.href", e).await),
        }
    }

    async fn wait_gone(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        self.wait_for(selector, timeout, &gone_js(selector)).await
    }

    async fn wait_clickable(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        self.wait_for(selector, timeout, &clickable_js(selector))
            .await
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        self.wait_for(selector, timeout, &visible_js(selector))
            .await
    }

    async fn wait_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> DriverResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.eval_bool(&exists_js(selector)).await? {
                let element = match self.page.find_element(selector).await {
                    Ok(el) => el,
                    Err(e) => return Err(self.classify("find_element", e).await),
                };
                return match element.attribute(attribute).await {
                    Ok(value) => Ok(value),
                    Err(e) => Err(self.classify("attribute", e).await),
                };
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        if !self.eval_bool(&exists_js(selector)).await? {
            return Err(DriverError::NotFound(selector.to_string()));
        }
        let element = match self.page.find_element(selector).await {
            Ok(el) => el,
            Err(e) => return Err(self.classify("find_element", e).await),
        };
        if let Err(e) = element.click().await {
            return Err(self.classify("click", e).await);
        }
        Ok(())
    }

    async fn is_enabled(&self, selector: &str) -> DriverResult<bool> {
        match self.eval_value(&enabled_js(selector)).await? {
            Value::Bool(enabled) => Ok(enabled),
            _ => Err(DriverError::NotFound(selector.to_string())),
        }
    }

    async fn type_into(&self, selector: &str, text: &str) -> DriverResult<()> {
        if !self.eval_bool(&exists_js(selector)).await? {
            return Err(DriverError::NotFound(selector.to_string()));
        }
        let element = match self.page.find_element(selector).await {
            Ok(el) => el,
            Err(e) => return Err(self.classify("find_element", e).await),
        };
        if let Err(e) = element.click().await {
            return Err(self.classify("focus", e).await);
        }
        if let Err(e) = element.type_str(text).await {
            return Err(self.classify("type_str", e).await);
        }
        Ok(())
    }

    async fn execute_js(&self, script: &str) -> DriverResult<Value> {
        self.eval_value(script).await
    }

    async fn page_source(&self) -> DriverResult<String> {
        match self.page.content().await {
            Ok(html) => Ok(html),
            Err(e) => Err(self.classify("content", e).await),
        }
    }

    async fn print_pdf(&self) -> DriverResult<Vec<u8>> {
        let params = PrintToPdfParams {
            landscape: Some(false),
            display_header_footer: Some(false),
            print_background: Some(true),
            ..Default::default()
        };
        match self.page.pdf(params).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => Err(self.classify("print_to_pdf", e).await),
        }
    }

    async fn screenshot_png(&self) -> DriverResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        match self.page.screenshot(params).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => Err(self.classify("screenshot", e).await),
        }
    }

    async fn close(&mut self) -> DriverResult<()> {
        let result = self.browser.close().await;
        self.handler.abort();
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(DriverError::Protocol(format!("close: {e}"))),
        }
    }
}

/// Launches a fresh visible browser per `create()` call.
pub struct CdpDriverFactory {
    executable: Option<String>,
    width: u32,
    height: u32,
}

impl CdpDriverFactory {
    pub fn new(executable: Option<String>, width: u32, height: u32) -> Self {
        Self {
            executable,
            width,
            height,
        }
    }

    pub fn from_config(cfg: &crate::core::AppConfig) -> Self {
        Self::new(
            cfg.chrome_executable.clone(),
            cfg.window_width,
            cfg.window_height,
        )
    }
}

#[async_trait]
impl DriverFactory for CdpDriverFactory {
    async fn create(&self) -> DriverResult<Box<dyn Driver>> {
        let exe = match &self.executable {
            Some(path) => path.clone(),
            None => manager::find_chrome_executable().ok_or_else(|| {
                DriverError::Launch(
                    "No browser found. Install Chrome, Chromium, or Brave, or set \
                     CHROME_EXECUTABLE to the binary path."
                        .to_string(),
                )
            })?,
        };

        info!("🚀 Launching browser session ({})", exe);

        let config = manager::build_browser_config(&exe, self.width, self.height)
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(format!("launch ({exe}): {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("browser close error (non-fatal): {}", close_err);
                }
                handler_task.abort();
                return Err(DriverError::Launch(format!("open tab: {e}")));
            }
        };

        Ok(Box::new(CdpDriver {
            browser,
            page,
            handler: handler_task,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_snippets_quote_selectors() {
        // The terms control id contains a colon and the selector single
        // quotes; both must survive JSON quoting.
        let js = clickable_js("[id='aceptaOption:0']");
        assert!(js.contains(r#"document.querySelector("[id='aceptaOption:0']")"#));
        assert!(js.contains("getClientRects"));
        assert!(gone_js(".preloader").contains("=== null"));
        assert!(enabled_js("#x").contains("!el.disabled"));
    }
}

//! Session Orchestrator for the WebJudicial consultation flow.
//!
//! One identifier is processed by a bounded retry loop; each attempt drives a
//! fresh browser through navigate → accept terms → submit → captcha →
//! results → PDF export, tracked by [`AttemptPhase`]. Failures are classified
//! at their source into [`AttemptError`]; only a missing credential aborts
//! the remaining budget. Every browser instance created during an attempt is
//! closed before the loop advances, on every path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::artifacts;
use crate::browser::{Driver, DriverError, DriverFactory};
use crate::captcha::{response_token, sitekey, CaptchaError, CaptchaResolver};
use crate::core::config::AppConfig;
use crate::core::types::{log_phase, AttemptError, AttemptPhase, QueryOutcome};

/// Stable element identifiers of the WebJudicial front end. Any drift here is
/// a hard compatibility break with the service.
pub mod selectors {
    pub const PRELOADER: &str = ".preloader";
    pub const TERMS_ACCEPT: &str = "[id='aceptaOption:0']";
    pub const SUBMIT: &str = "[id='continuarBtn']";
    pub const IDENTIFIER_INPUT: &str = "[id='cedulaInput']";
    pub const CONSULT: &str = "[id='j_idt17']";
    /// Raw id of the hidden token field, used inside the injection script.
    pub const CAPTCHA_RESPONSE_ID: &str = "g-recaptcha-response";
}

const MANUAL_INSTRUCTIONS: &str = "\n❗ MANUAL MODE:\n   1. Solve the CAPTCHA in the browser window.\n   2. Click the 'Consultar' button.\n   3. Once the results are visible, press Enter here to continue...\n";

/// Blocking operator intervention channel for the manual captcha fallback.
#[async_trait]
pub trait OperatorConsole: Send + Sync {
    /// Show `instructions` and block until the operator confirms.
    async fn wait_for_operator(&self, instructions: &str) -> std::io::Result<()>;
}

/// Terminal-backed console: prints the instructions and blocks on a line of
/// stdin. EOF counts as "no operator attached".
pub struct StdinConsole;

#[async_trait]
impl OperatorConsole for StdinConsole {
    async fn wait_for_operator(&self, instructions: &str) -> std::io::Result<()> {
        eprintln!("{instructions}");
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            let read = std::io::stdin().read_line(&mut line)?;
            if read == 0 {
                return Err(std::io::Error::other("stdin closed, no operator attached"));
            }
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

pub struct Orchestrator {
    cfg: AppConfig,
    factory: Arc<dyn DriverFactory>,
    resolver: Option<Arc<dyn CaptchaResolver>>,
    console: Arc<dyn OperatorConsole>,
}

impl Orchestrator {
    pub fn new(
        cfg: AppConfig,
        factory: Arc<dyn DriverFactory>,
        resolver: Option<Arc<dyn CaptchaResolver>>,
        console: Arc<dyn OperatorConsole>,
    ) -> Self {
        Self {
            cfg,
            factory,
            resolver,
            console,
        }
    }

    /// Run the bounded retry loop for one identifier. Never panics and never
    /// returns an error — the terminal state is the outcome.
    pub async fn process(&self, cedula: &str) -> QueryOutcome {
        let budget = self.cfg.max_attempts;

        for attempt in 1..=budget {
            info!("--- attempt #{attempt} of {budget} for {cedula} ---");

            let mut driver = match self.factory.create().await {
                Ok(driver) => driver,
                Err(e) => {
                    error!("attempt #{attempt}: browser launch failed: {e}");
                    continue;
                }
            };

            let result = self.run_attempt(&mut driver, cedula).await;

            if let Err(err) = &result {
                log_phase(AttemptPhase::Failed);
                error!("attempt #{attempt} for {cedula} failed: {err}");
                artifacts::save_error_screenshot(
                    driver.as_ref(),
                    &self.cfg.errors_dir,
                    cedula,
                    attempt,
                )
                .await;
            }

            if let Err(close_err) = driver.close().await {
                warn!("browser close error (non-fatal): {close_err}");
            }

            match result {
                Ok(artifact) => {
                    return QueryOutcome::Completed { attempts: attempt, artifact };
                }
                Err(err) if !err.recoverable() => {
                    error!("non-recoverable failure for {cedula}, abandoning remaining attempts: {err}");
                    return QueryOutcome::Failed { attempts: attempt };
                }
                Err(_) => {}
            }
        }

        QueryOutcome::Failed { attempts: budget }
    }

    /// One full pass through the consultation flow. On success returns the
    /// exported artifact path (or `None` when the export failed — logged,
    /// never fatal).
    async fn run_attempt(
        &self,
        driver: &mut Box<dyn Driver>,
        cedula: &str,
    ) -> Result<Option<std::path::PathBuf>, AttemptError> {
        log_phase(AttemptPhase::NotStarted);
        self.open_service(driver.as_ref()).await?;

        // The session can die while the terms dialog settles; a stale browser
        // here means recreate and walk the entry steps again.
        if !driver.is_alive().await {
            warn!("browser stale after terms acceptance, recreating");
            if let Err(e) = driver.close().await {
                warn!("stale browser close error (non-fatal): {e}");
            }
            *driver = self.factory.create().await.map_err(classify_driver)?;
            self.open_service(driver.as_ref()).await?;
        }

        match driver.is_enabled(selectors::SUBMIT).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("submit control is disabled, abandoning this browser");
                return Err(AttemptError::ElementUnavailable(
                    "submit control disabled".to_string(),
                ));
            }
            Err(e) => return Err(classify_driver(e)),
        }

        driver
            .click(selectors::SUBMIT)
            .await
            .map_err(classify_driver)?;
        driver
            .wait_visible(selectors::IDENTIFIER_INPUT, self.cfg.wait_timeout())
            .await
            .map_err(classify_driver)?;
        driver
            .type_into(selectors::IDENTIFIER_INPUT, cedula)
            .await
            .map_err(classify_driver)?;
        log_phase(AttemptPhase::FormReady);

        self.resolve_captcha(driver.as_ref()).await?;
        log_phase(AttemptPhase::Submitted);

        info!(
            "waiting {}s for the consultation results to render",
            self.cfg.settle().as_secs()
        );
        tokio::time::sleep(self.cfg.settle()).await;

        let artifact =
            artifacts::save_results_pdf(driver.as_ref(), &self.cfg.results_dir, cedula).await;
        log_phase(AttemptPhase::Completed);
        Ok(artifact)
    }

    /// Navigate to the service, dismiss the loading overlay, accept the terms
    /// dialog, and give the page scripts a moment to react.
    async fn open_service(&self, driver: &dyn Driver) -> Result<(), AttemptError> {
        driver
            .goto(&self.cfg.service_url)
            .await
            .map_err(classify_driver)?;
        driver
            .wait_gone(selectors::PRELOADER, self.cfg.wait_timeout())
            .await
            .map_err(classify_driver)?;
        log_phase(AttemptPhase::Navigated);

        driver
            .wait_clickable(selectors::TERMS_ACCEPT, self.cfg.wait_timeout())
            .await
            .map_err(classify_driver)?;
        driver
            .click(selectors::TERMS_ACCEPT)
            .await
            .map_err(classify_driver)?;
        tokio::time::sleep(self.cfg.terms_pause()).await;
        log_phase(AttemptPhase::TermsAccepted);
        Ok(())
    }

    /// Automated resolution when a resolver is configured; any failure in
    /// that path downgrades to the blocking manual fallback.
    async fn resolve_captcha(&self, driver: &dyn Driver) -> Result<(), AttemptError> {
        let automated = match &self.resolver {
            Some(resolver) => {
                info!("attempting automated recaptcha resolution");
                self.solve_automatically(driver, resolver.as_ref()).await
            }
            None => Err(CaptchaError::Unconfigured),
        };

        let failure = match automated {
            Ok(()) => {
                log_phase(AttemptPhase::CaptchaResolved);
                return Ok(());
            }
            Err(err) => err,
        };

        warn!("automated captcha resolution unavailable ({failure}), switching to manual mode");
        let unconfigured = matches!(failure, CaptchaError::Unconfigured);

        match self.console.wait_for_operator(MANUAL_INSTRUCTIONS).await {
            Ok(()) => {
                log_phase(AttemptPhase::CaptchaResolved);
                Ok(())
            }
            Err(io_err) if unconfigured => Err(AttemptError::ConfigMissing(format!(
                "captcha credential unset and no operator console: {io_err}"
            ))),
            Err(io_err) => Err(AttemptError::CaptchaUnavailable(format!(
                "manual fallback unavailable: {io_err}"
            ))),
        }
    }

    async fn solve_automatically(
        &self,
        driver: &dyn Driver,
        resolver: &dyn CaptchaResolver,
    ) -> Result<(), CaptchaError> {
        let site_key = sitekey::extract(driver, self.cfg.wait_timeout()).await?;
        let page_url = driver.current_url().await?;

        let response = resolver.solve(&site_key, &page_url).await?;
        let token = response_token(&response)
            .ok_or_else(|| CaptchaError::MalformedResponse(response.to_string()))?;

        driver.execute_js(&inject_token_script(&token)).await?;
        info!("recaptcha token injected");

        tokio::time::sleep(self.cfg.post_solve_pause()).await;
        driver.click(selectors::CONSULT).await?;
        Ok(())
    }
}

fn classify_driver(e: DriverError) -> AttemptError {
    match e {
        DriverError::WindowClosed(msg) => AttemptError::BrowserLost(msg),
        DriverError::Timeout { .. } | DriverError::NotFound(_) => {
            AttemptError::ElementUnavailable(e.to_string())
        }
        DriverError::Launch(msg) => AttemptError::Unknown(format!("browser launch: {msg}")),
        DriverError::Protocol(msg) => AttemptError::Unknown(msg),
    }
}

/// Script that reveals the hidden response field, stores the token, and fires
/// the `change` event the page listens for.
pub fn inject_token_script(token: &str) -> String {
    let quoted = Value::String(token.to_string()).to_string();
    let id = selectors::CAPTCHA_RESPONSE_ID;
    format!(
        "document.getElementById('{id}').style.display = 'block';\
         document.getElementById('{id}').value = {quoted};\
         document.getElementById('{id}').dispatchEvent(new Event('change'));"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injection_script_quotes_the_token() {
        let script = inject_token_script(r#"to"ken'\"#);
        assert!(script.contains(r#"document.getElementById('g-recaptcha-response').value = "to\"ken'\\""#));
        assert!(script.contains("dispatchEvent(new Event('change'))"));
    }

    #[test]
    fn driver_errors_classify_without_string_matching() {
        assert!(matches!(
            classify_driver(DriverError::WindowClosed("gone".into())),
            AttemptError::BrowserLost(_)
        ));
        assert!(matches!(
            classify_driver(DriverError::Timeout {
                selector: ".preloader".into(),
                waited_ms: 20_000
            }),
            AttemptError::ElementUnavailable(_)
        ));
        assert!(matches!(
            classify_driver(DriverError::NotFound("#x".into())),
            AttemptError::ElementUnavailable(_)
        ));
        assert!(matches!(
            classify_driver(DriverError::Protocol("weird".into())),
            AttemptError::Unknown(_)
        ));
    }
}

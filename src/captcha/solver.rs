//! 2Captcha client for reCAPTCHA v2 tokens.
//!
//! Submit the site key + page URL to `in.php`, then poll `res.php` until the
//! worker pool produces a token. The raw reply is surfaced as JSON shaped
//! like the backend's own response (`{"captchaId", "code"}`) — the
//! orchestrator owns token extraction, so it can accept the several field
//! names the backend has been seen to use.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::browser::DriverError;

const SUBMIT_URL: &str = "http://2captcha.com/in.php";
const RESULT_URL: &str = "http://2captcha.com/res.php";
const NOT_READY: &str = "CAPCHA_NOT_READY";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLLS: u32 = 30;

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha solver credential not configured")]
    Unconfigured,

    #[error("recaptcha site key not found by any strategy")]
    SitekeyNotFound,

    #[error("solver error: {0}")]
    Solver(String),

    #[error("unexpected solver response shape: {0}")]
    MalformedResponse(String),

    #[error("solver transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Captcha-solving backend. Returns the raw solver response; the caller
/// extracts the token via [`response_token`].
#[async_trait]
pub trait CaptchaResolver: Send + Sync {
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<Value, CaptchaError>;
}

/// Pull the token out of a solver response, accepting the field names the
/// backend is known to answer with.
pub fn response_token(response: &Value) -> Option<String> {
    for field in ["code", "token", "gRecaptchaResponse"] {
        if let Some(token) = response.get(field).and_then(Value::as_str) {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    None
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    key: &'a str,
    method: &'a str,
    googlekey: &'a str,
    pageurl: &'a str,
    json: u8,
}

#[derive(Deserialize)]
struct ApiResponse {
    status: i32,
    request: String,
}

pub struct TwoCaptcha {
    client: reqwest::Client,
    api_key: String,
}

impl TwoCaptcha {
    pub fn new(api_key: String) -> Result<Self, CaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl CaptchaResolver for TwoCaptcha {
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<Value, CaptchaError> {
        let submit = SubmitRequest {
            key: &self.api_key,
            method: "userrecaptcha",
            googlekey: site_key,
            pageurl: page_url,
            json: 1,
        };

        let reply: ApiResponse = self
            .client
            .post(SUBMIT_URL)
            .form(&submit)
            .send()
            .await?
            .json()
            .await?;

        if reply.status != 1 {
            return Err(CaptchaError::Solver(format!(
                "task rejected: {}",
                reply.request
            )));
        }
        let captcha_id = reply.request;
        info!("2captcha task {} submitted, polling for the token", captcha_id);

        for _ in 0..MAX_POLLS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let url = format!(
                "{RESULT_URL}?key={}&action=get&id={}&json=1",
                self.api_key, captcha_id
            );
            let reply: ApiResponse = self.client.get(&url).send().await?.json().await?;

            if reply.status == 1 {
                return Ok(serde_json::json!({
                    "captchaId": captcha_id,
                    "code": reply.request,
                }));
            }
            if reply.request != NOT_READY {
                return Err(CaptchaError::Solver(reply.request));
            }
        }

        Err(CaptchaError::Solver(format!(
            "token not ready after {} polls",
            MAX_POLLS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_accepted_under_every_known_field_name() {
        assert_eq!(
            response_token(&json!({"code": "abc"})).as_deref(),
            Some("abc")
        );
        assert_eq!(
            response_token(&json!({"token": "def"})).as_deref(),
            Some("def")
        );
        assert_eq!(
            response_token(&json!({"gRecaptchaResponse": "ghi"})).as_deref(),
            Some("ghi")
        );
    }

    #[test]
    fn token_field_precedence_and_rejection() {
        // `code` wins when several fields are present.
        assert_eq!(
            response_token(&json!({"token": "t", "code": "c"})).as_deref(),
            Some("c")
        );
        assert_eq!(response_token(&json!({"code": ""})), None);
        assert_eq!(response_token(&json!({"captchaId": "42"})), None);
        assert_eq!(response_token(&json!(null)), None);
    }
}

pub mod artifacts;
pub mod batch;
pub mod browser;
pub mod captcha;
pub mod core;
pub mod query;

// --- Primary exports ---
pub use core::config::AppConfig;
pub use core::types::{AttemptError, AttemptPhase, QueryOutcome};

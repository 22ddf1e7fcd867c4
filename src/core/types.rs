use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Classified failure of a single consultation attempt, produced at the point
/// of failure rather than recovered from error text.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("browser window lost: {0}")]
    BrowserLost(String),

    #[error("required element unavailable: {0}")]
    ElementUnavailable(String),

    #[error("captcha could not be resolved: {0}")]
    CaptchaUnavailable(String),

    #[error("required configuration missing: {0}")]
    ConfigMissing(String),

    #[error("unclassified failure: {0}")]
    Unknown(String),
}

impl AttemptError {
    /// Whether the retry loop may spend another attempt on this identifier.
    /// Only a missing credential aborts the remaining budget — retrying
    /// cannot conjure configuration.
    pub fn recoverable(&self) -> bool {
        !matches!(self, AttemptError::ConfigMissing(_))
    }
}

/// Terminal state of one identifier's consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The flow ran to completion. `artifact` is the written PDF path, or
    /// `None` when the export itself failed (logged, not fatal).
    Completed {
        attempts: u32,
        artifact: Option<PathBuf>,
    },
    /// Every attempt in the budget failed, or a non-recoverable failure cut
    /// the budget short.
    Failed { attempts: u32 },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Completed { .. })
    }
}

/// Progress of one attempt through the consultation flow. Transitions are
/// logged so a failed run shows exactly how far it got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptPhase {
    NotStarted,
    Navigated,
    TermsAccepted,
    FormReady,
    CaptchaResolved,
    Submitted,
    Completed,
    Failed,
}

pub fn log_phase(phase: AttemptPhase) {
    info!("attempt_phase={:?}", phase);
}

// Refinement run data types

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::extract::Verdict;
use crate::session::SessionToken;
use crate::stylesheet::{BlockKey, StyleDocument};

/// Tunables for one refinement run.
#[derive(Debug, Clone)]
pub struct RefineConfig {
    /// Generation rounds before giving up.
    pub max_iterations: u32,
    /// Optional evaluator score at which the run converges early.
    pub quality_threshold: Option<f32>,
    /// Attempts per model call (including the first).
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    /// Pause between applying styles and capturing, so the renderer can
    /// repaint. Captures taken immediately reflect stale paint.
    pub settle_delay: Duration,
    /// Ceiling on one capture request.
    pub capture_timeout: Duration,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            quality_threshold: None,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            settle_delay: Duration::from_millis(600),
            capture_timeout: Duration::from_secs(10),
        }
    }
}

/// What the caller wants restyled, and where the result lands in the
/// managed stylesheet. Reference images and prior CSS travel here; the
/// orchestrator reads no ambient state.
#[derive(Debug, Clone)]
pub struct RefineRequest {
    pub intent: String,
    pub reference_images: Vec<ReferenceImage>,
    /// Block the generated stylesheet is upserted under.
    pub key: BlockKey,
    /// Stylesheet already under management (may carry adopted literal
    /// content and blocks from earlier runs).
    pub baseline: StyleDocument,
}

impl RefineRequest {
    pub fn new(intent: impl Into<String>, key: BlockKey) -> Self {
        Self {
            intent: intent.into(),
            reference_images: Vec::new(),
            key,
            baseline: StyleDocument::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub media_type: String,
    pub data: String,
}

/// Pipeline stage of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generating,
    Applying,
    Capturing,
    Evaluating,
    Deciding,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Generating => "generating",
            Stage::Applying => "applying",
            Stage::Capturing => "capturing",
            Stage::Evaluating => "evaluating",
            Stage::Deciding => "deciding",
        };
        f.write_str(name)
    }
}

/// Progress event streamed to the presentation layer.
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub iteration: u32,
    pub stage: Stage,
    pub message: String,
}

/// Terminal state of a run. `Converged` and `Exhausted` are successes:
/// the stylesheet at that point is the result.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Converged,
    Exhausted,
    Cancelled,
    Failed {
        stage: Stage,
        iteration: u32,
        error: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Converged | Outcome::Exhausted)
    }
}

/// One completed iteration.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub verdict: Verdict,
    pub applied_css: String,
}

/// Final result handed back to the caller.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    pub final_css: String,
    pub history: Vec<HistoryEntry>,
}

/// Bookkeeping for one model call. A fresh session token is minted per
/// attempt so the provider cannot link it to any other call; the struct is
/// discarded once the call resolves.
#[derive(Debug)]
pub struct GenerationAttempt {
    pub iteration: u32,
    pub retry_count: u32,
    pub session: SessionToken,
    pub started_at: DateTime<Utc>,
}

impl GenerationAttempt {
    pub fn begin(iteration: u32) -> Self {
        Self {
            iteration,
            retry_count: 0,
            session: SessionToken::fresh(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_get_distinct_sessions() {
        let a = GenerationAttempt::begin(1);
        let b = GenerationAttempt::begin(1);
        assert_ne!(a.session, b.session);
    }

    #[test]
    fn test_outcome_success_split() {
        assert!(Outcome::Converged.is_success());
        assert!(Outcome::Exhausted.is_success());
        assert!(!Outcome::Cancelled.is_success());
        assert!(!Outcome::Failed {
            stage: Stage::Applying,
            iteration: 2,
            error: "x".into()
        }
        .is_success());
    }

    #[test]
    fn test_config_defaults_are_sane() {
        let config = RefineConfig::default();
        assert!(config.max_iterations >= 1);
        assert!(config.max_attempts >= 1);
        assert!(config.quality_threshold.is_none());
    }
}

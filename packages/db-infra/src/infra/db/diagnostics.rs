//! Statistics for a single changelog run.

use std::fmt;
use std::time::Duration;

use tracing::info;

use crate::error::MigrationError;

/// How a changelog run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Applied,
    UpToDate,
    StatusOnly,
    LockTimeout,
    BodyTimeout,
    Cancelled,
    VerificationMismatch,
    Failed,
}

impl RunOutcome {
    pub fn from_error(err: &MigrationError) -> Self {
        match err {
            MigrationError::LockTimeout { .. } => Self::LockTimeout,
            MigrationError::BodyTimeout { .. } => Self::BodyTimeout,
            MigrationError::Cancelled { .. } => Self::Cancelled,
            MigrationError::Verification { .. } => Self::VerificationMismatch,
            _ => Self::Failed,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::UpToDate => "up_to_date",
            Self::StatusOnly => "status_only",
            Self::LockTimeout => "lock_timeout",
            Self::BodyTimeout => "body_timeout",
            Self::Cancelled => "cancelled",
            Self::VerificationMismatch => "verification_mismatch",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one run did on its way to the changelog lock and under it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Up-to-date checks against the prefixed changelog table.
    pub schema_checks: u32,
    /// Conditional updates issued against the lock row.
    pub lock_attempts: u32,
    /// Sleeps between lock attempts.
    pub backoff_events: u32,
    pub lock_wait: Duration,
    /// Time spent in the migrator, zero if it never ran.
    pub body_time: Duration,
}

impl RunStats {
    pub(crate) fn log(&self, changelog: &str, outcome: RunOutcome) {
        info!(
            changelog = changelog,
            outcome = %outcome,
            schema_checks = self.schema_checks,
            lock_attempts = self.lock_attempts,
            backoff_events = self.backoff_events,
            lock_wait_ms = self.lock_wait.as_millis(),
            body_ms = self.body_time.as_millis(),
            "changelog_run_stats"
        );
    }
}

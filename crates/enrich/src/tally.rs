use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Why an item did not make it through a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MalformedEnvelope,
    MalformedPayload,
    NotAnObject,
    MissingField,
    VerificationFailed,
    TargetNotFound,
    Transport,
    Io,
    Graph,
}

impl FailureReason {
    pub const ALL: [FailureReason; 9] = [
        FailureReason::MalformedEnvelope,
        FailureReason::MalformedPayload,
        FailureReason::NotAnObject,
        FailureReason::MissingField,
        FailureReason::VerificationFailed,
        FailureReason::TargetNotFound,
        FailureReason::Transport,
        FailureReason::Io,
        FailureReason::Graph,
    ];

    fn slot(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::MalformedEnvelope => "malformed_envelope",
            FailureReason::MalformedPayload => "malformed_payload",
            FailureReason::NotAnObject => "not_an_object",
            FailureReason::MissingField => "missing_field",
            FailureReason::VerificationFailed => "verification_failed",
            FailureReason::TargetNotFound => "target_not_found",
            FailureReason::Transport => "transport",
            FailureReason::Io => "io",
            FailureReason::Graph => "graph",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run outcome counters, shared by the workers of one batch
#[derive(Default)]
pub struct RunTally {
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    skipped: AtomicUsize,
    failures: [AtomicUsize; 9],
}

impl RunTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, reason: FailureReason) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failures[reason.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// Item left alone on purpose, e.g. output already present
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TallySnapshot {
        let failures: BTreeMap<FailureReason, usize> = FailureReason::ALL
            .iter()
            .map(|r| (*r, self.failures[r.slot()].load(Ordering::Relaxed)))
            .filter(|(_, n)| *n > 0)
            .collect();

        TallySnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: failures.values().sum(),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TallySnapshot {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: BTreeMap<FailureReason, usize>,
}

impl TallySnapshot {
    pub fn count(&self, reason: FailureReason) -> usize {
        self.failures.get(&reason).copied().unwrap_or(0)
    }

    /// End-of-run summary line, plus one line per failure reason
    pub fn log_summary(&self, stage: &str) {
        info!(
            stage,
            processed = self.processed,
            succeeded = self.succeeded,
            failed = self.failed,
            skipped = self.skipped,
            "Run finished"
        );
        for (reason, count) in &self.failures {
            warn!(stage, reason = %reason, count, "Failures by reason");
        }
    }
}

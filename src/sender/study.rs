use std::sync::Arc;
use std::time::Duration;

use dimse::{Connector, DestinationEndpoint, ScuTimeouts};
use tracing::{debug, error, info, warn};

use crate::sender::batch::BatchTransmitter;
use crate::sender::parser::InstanceParser;
use crate::sender::progress::SendProgress;
use crate::sender::scan::{scan_study, StudyScan};
use crate::sender::state::RunState;
use crate::storage::{StudyDescriptor, StudyStore};

/// Retry and backoff settings of the study send loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive zero-progress attempts before the study is given up for this run
    pub retry_limit: u32,
    /// Wait after a zero-progress attempt
    pub backoff: Duration,
    /// Worst-case delay before a backoff wait notices cancellation
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 10_000,
            backoff: Duration::from_secs(60),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Counts consecutive attempts that acknowledged nothing
#[derive(Debug, Clone)]
pub struct StallCounter {
    retries: u32,
    limit: u32,
}

impl StallCounter {
    pub fn new(limit: u32) -> Self {
        Self { retries: 0, limit }
    }

    /// Record one attempt; returns true when the caller should back off.
    pub fn observe(&mut self, before: usize, after: usize) -> bool {
        if after > 0 && after == before && self.retries < self.limit {
            self.retries += 1;
            true
        } else {
            self.retries = 0;
            false
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn exhausted(&self) -> bool {
        self.retries >= self.limit
    }
}

/// How the send loop of one study ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyOutcome {
    /// Every instance was acknowledged and the study was marked sent
    Sent,
    /// Every instance was acknowledged but the store could not be updated
    MarkFailed,
    /// Cancellation stopped the loop with instances left
    Cancelled,
    /// The retry limit was reached with instances left
    RetriesExhausted,
}

/// Summary of one study's send loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyReport {
    pub study_uid: String,
    pub outcome: StudyOutcome,
    pub instances_sent: usize,
    pub instances_remaining: usize,
    pub attempts: u32,
    pub backoff_waits: u32,
}

/// Everything a worker needs to send studies, shared by all workers of a run
pub struct SendContext {
    pub endpoint: DestinationEndpoint,
    pub timeouts: ScuTimeouts,
    pub policy: RetryPolicy,
    pub connector: Arc<dyn Connector>,
    pub parser: Arc<dyn InstanceParser>,
    pub store: Arc<dyn StudyStore>,
    pub state: Arc<RunState>,
    pub progress: Arc<SendProgress>,
}

impl SendContext {
    /// Drive one study until it is fully sent, cancelled, or out of retries.
    pub async fn send_study(&self, study: &StudyDescriptor) -> StudyReport {
        info!(study_uid = %study.study_uid, path = %study.path.display(), "Sending study");

        let scan = self.scan(study).await;
        if let Some(found) = scan.study_uid.as_deref() {
            if found != study.study_uid {
                warn!(
                    study_uid = %study.study_uid,
                    "Files under {} belong to study {}",
                    study.path.display(),
                    found
                );
            }
        }

        let StudyScan {
            mut pending,
            grouping,
            cancelled,
            ..
        } = scan;
        let total = pending.len();
        let transmitter = BatchTransmitter {
            connector: self.connector.as_ref(),
            endpoint: &self.endpoint,
            timeouts: &self.timeouts,
            state: &self.state,
        };

        let mut stall = StallCounter::new(self.policy.retry_limit);
        let mut attempts = 0;
        let mut backoff_waits = 0;

        // an interrupted scan says nothing about what the study contains
        if !cancelled {
            while !pending.is_empty() && !self.state.is_canceled() && !stall.exhausted() {
                let before = pending.len();
                attempts += 1;
                let outcome = transmitter.send_batch(&grouping, &mut pending).await;
                let after = pending.len();

                self.progress.add_instances_sent(before - after);
                debug!(
                    study_uid = %study.study_uid,
                    "Attempt {} ended {:?}: {} of {} instances left",
                    attempts,
                    outcome,
                    after,
                    total
                );

                if stall.observe(before, after) {
                    if self.state.is_canceled() {
                        break;
                    }
                    warn!(
                        study_uid = %study.study_uid,
                        "No progress ({} pending), retry {} of {} in {:?}",
                        after,
                        stall.retries(),
                        self.policy.retry_limit,
                        self.policy.backoff
                    );
                    backoff_waits += 1;
                    self.state
                        .wait_unless_cancelled(self.policy.backoff, self.policy.poll_interval)
                        .await;
                }
            }
        }

        let outcome = if cancelled {
            StudyOutcome::Cancelled
        } else if pending.is_empty() {
            match self.store.mark_sent(&study.study_uid).await {
                Ok(()) => StudyOutcome::Sent,
                Err(e) => {
                    error!(study_uid = %study.study_uid, "Failed to mark study sent: {}", e);
                    StudyOutcome::MarkFailed
                }
            }
        } else if self.state.is_canceled() {
            StudyOutcome::Cancelled
        } else {
            StudyOutcome::RetriesExhausted
        };

        let report = StudyReport {
            study_uid: study.study_uid.clone(),
            outcome,
            instances_sent: total - pending.len(),
            instances_remaining: pending.len(),
            attempts,
            backoff_waits,
        };
        self.progress.record_study(outcome);

        match outcome {
            StudyOutcome::Sent => info!(
                study_uid = %study.study_uid,
                "Study sent ({} instances, {} attempts)",
                report.instances_sent,
                report.attempts
            ),
            _ => warn!(
                study_uid = %study.study_uid,
                "Study left pending: {:?} ({} instances remaining)",
                outcome,
                report.instances_remaining
            ),
        }
        report
    }

    /// Walk the study directory off the async workers
    async fn scan(&self, study: &StudyDescriptor) -> StudyScan {
        let path = study.path.clone();
        let parser = self.parser.clone();
        let state = self.state.clone();
        match tokio::task::spawn_blocking(move || scan_study(&path, parser.as_ref(), &state)).await {
            Ok(scan) => scan,
            Err(e) => {
                error!(study_uid = %study.study_uid, "Study scan failed: {}", e);
                // nothing was learned, so nothing may be marked sent either
                StudyScan {
                    cancelled: true,
                    ..StudyScan::default()
                }
            }
        }
    }
}

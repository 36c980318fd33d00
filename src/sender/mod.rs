//! Study sending: scan, batch transmission, retry loop and the scheduler
//! driving them across a pool of workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dimse::{Connector, DestinationEndpoint, ScuTimeouts};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::SenderError;
use crate::storage::{create_study_store, StudyDescriptor, StudyStore};

pub mod batch;
pub mod natural;
pub mod parser;
pub mod progress;
pub mod scan;
pub mod scheduler;
pub mod state;
pub mod study;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{build_proposals, BatchOutcome, BatchTransmitter};
pub use natural::{natural_cmp, InstanceKey};
pub use parser::{DicomFileParser, InstanceParser, ParsedInstance};
pub use progress::{ProgressSnapshot, SendProgress};
pub use scan::{scan_study, ClassFormatGrouping, PendingSet, StudyScan};
pub use scheduler::{run_send, RunSummary};
pub use state::RunState;
pub use study::{RetryPolicy, SendContext, StallCounter, StudyOutcome, StudyReport};

/// Control surface for sending pending studies to a DICOM destination
pub struct DicomSender {
    connector: Arc<dyn Connector>,
    parser: Arc<dyn InstanceParser>,
    store: Arc<dyn StudyStore>,
    policy: RetryPolicy,
    timeouts: ScuTimeouts,
    state: Arc<RunState>,
    progress: Arc<SendProgress>,
}

/// Handle to a send run started with [`DicomSender::start_send`]
pub struct SendHandle {
    inner: JoinHandle<RunSummary>,
}

/// A study directory added to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyRegistration {
    pub study_uid: String,
    pub path: PathBuf,
    pub instances: usize,
}

impl SendHandle {
    /// Wait for every worker to finish
    pub async fn join(self) -> Result<RunSummary, SenderError> {
        Ok(self.inner.await?)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl DicomSender {
    pub fn new(
        connector: Arc<dyn Connector>,
        parser: Arc<dyn InstanceParser>,
        store: Arc<dyn StudyStore>,
    ) -> Self {
        Self {
            connector,
            parser,
            store,
            policy: RetryPolicy::default(),
            timeouts: ScuTimeouts::default(),
            state: Arc::new(RunState::new()),
            progress: Arc::new(SendProgress::new()),
        }
    }

    /// Build a sender for `connector` with the configured store, retry
    /// policy and timeouts
    pub fn from_config(config: &Config, connector: Arc<dyn Connector>) -> Result<Self, SenderError> {
        config.validate()?;
        let store = create_study_store(&config.storage)?;
        Ok(Self::new(connector, Arc::new(DicomFileParser::new()), store)
            .with_retry_policy(config.sender.retry_policy())
            .with_timeouts(config.timeouts.clone()))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ScuTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Start a send run on the runtime and return immediately.
    ///
    /// Cancellation is cleared and `done` reset before this returns, so the
    /// caller never observes a stale `is_done()` from a previous run.
    pub fn start_send(&self, endpoint: DestinationEndpoint, threads: usize) -> SendHandle {
        self.state.clear_cancel();
        self.state.set_done(false);

        let ctx = Arc::new(SendContext {
            endpoint,
            timeouts: self.timeouts.clone(),
            policy: self.policy.clone(),
            connector: self.connector.clone(),
            parser: self.parser.clone(),
            store: self.store.clone(),
            state: self.state.clone(),
            progress: self.progress.clone(),
        });
        SendHandle {
            inner: tokio::spawn(run_send(ctx, threads)),
        }
    }

    /// Request cancellation; workers stop at their next checkpoint
    pub fn cancel(&self) {
        info!("Send cancellation requested");
        self.state.cancel();
    }

    pub fn clear_cancel(&self) {
        self.state.clear_cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Scan `dir` for its Study Instance UID and register it as pending
    pub async fn register_study(&self, dir: &Path) -> Result<StudyRegistration, SenderError> {
        let scan_dir = dir.to_path_buf();
        let parser = self.parser.clone();
        let scan = tokio::task::spawn_blocking(move || {
            scan_study(&scan_dir, parser.as_ref(), &RunState::new())
        })
        .await?;

        let study_uid = scan
            .study_uid
            .ok_or_else(|| SenderError::NoStudy(dir.to_path_buf()))?;
        let path = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        self.store.register(&study_uid, path.clone()).await?;

        info!(study_uid = %study_uid, "Registered {} ({} instances)", path.display(), scan.pending.len());
        Ok(StudyRegistration {
            study_uid,
            path,
            instances: scan.pending.len(),
        })
    }

    /// Every study known to the store, sent or not
    pub async fn studies(&self) -> Result<Vec<StudyDescriptor>, SenderError> {
        Ok(self.store.enumerate().await?)
    }

    /// C-ECHO the destination. Independent of any run in progress.
    pub async fn echo(&self, endpoint: &DestinationEndpoint) -> bool {
        match self.connector.echo(endpoint, &self.timeouts).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("C-ECHO to {} failed: {}", endpoint, e);
                false
            }
        }
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::sender::study::{SendContext, StudyOutcome, StudyReport};
use crate::storage::StudyDescriptor;

/// What a finished run accomplished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub studies_queued: usize,
    pub reports: Vec<StudyReport>,
}

impl RunSummary {
    pub fn studies_sent(&self) -> usize {
        self.count(|o| o == StudyOutcome::Sent)
    }

    /// Studies whose pending flag is still set after the run
    pub fn studies_unfinished(&self) -> usize {
        self.count(|o| o != StudyOutcome::Sent)
    }

    pub fn instances_sent(&self) -> usize {
        self.reports.iter().map(|r| r.instances_sent).sum()
    }

    fn count(&self, pred: impl Fn(StudyOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(r.outcome)).count()
    }
}

type WorkQueue = Arc<Mutex<VecDeque<StudyDescriptor>>>;

/// Execute one full send run and return once every worker has exited.
///
/// The caller is responsible for resetting the lifecycle flags beforehand;
/// `done` is set here when the last worker is joined.
pub async fn run_send(ctx: Arc<SendContext>, threads: usize) -> RunSummary {
    let studies = match ctx.store.enumerate().await {
        Ok(studies) => studies,
        Err(e) => {
            error!("Failed to enumerate studies: {}", e);
            Vec::new()
        }
    };

    let queue: VecDeque<StudyDescriptor> = studies.into_iter().filter(|s| s.pending).collect();
    let studies_queued = queue.len();
    ctx.progress.reset(studies_queued);

    let threads = threads.max(1);
    info!(
        "Sending {} pending studies to {} with {} workers",
        studies_queued, ctx.endpoint, threads
    );

    let queue: WorkQueue = Arc::new(Mutex::new(queue));
    let workers: Vec<_> = (0..threads)
        .map(|worker_id| tokio::spawn(worker(worker_id, ctx.clone(), queue.clone())))
        .collect();

    let mut reports = Vec::with_capacity(studies_queued);
    for handle in workers {
        match handle.await {
            Ok(mut done) => reports.append(&mut done),
            Err(e) => error!("Send worker failed: {}", e),
        }
    }

    let summary = RunSummary {
        studies_queued,
        reports,
    };
    info!(
        "Send run complete: {} of {} studies sent, {} instances",
        summary.studies_sent(),
        summary.studies_queued,
        summary.instances_sent()
    );
    ctx.state.set_done(true);
    summary
}

async fn worker(worker_id: usize, ctx: Arc<SendContext>, queue: WorkQueue) -> Vec<StudyReport> {
    let mut reports = Vec::new();
    loop {
        if ctx.state.is_canceled() {
            debug!(worker_id, "Cancelled, not taking further studies");
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        let Some(study) = next else {
            break;
        };
        reports.push(ctx.send_study(&study).await);
    }
    debug!(worker_id, "Worker exiting after {} studies", reports.len());
    reports
}

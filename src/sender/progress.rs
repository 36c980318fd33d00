use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::sender::study::StudyOutcome;

/// Run-wide counters, updated by the workers and read by whoever is watching
#[derive(Debug, Default)]
pub struct SendProgress {
    studies_queued: AtomicU64,
    studies_sent: AtomicU64,
    studies_unfinished: AtomicU64,
    instances_sent: AtomicU64,
}

/// Point-in-time copy of [`SendProgress`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub studies_queued: u64,
    pub studies_sent: u64,
    pub studies_unfinished: u64,
    pub instances_sent: u64,
}

impl ProgressSnapshot {
    /// Studies neither sent nor given up on yet
    pub fn studies_in_flight(&self) -> u64 {
        self.studies_queued
            .saturating_sub(self.studies_sent + self.studies_unfinished)
    }
}

impl SendProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter at the start of a run
    pub fn reset(&self, studies_queued: usize) {
        self.studies_queued
            .store(studies_queued as u64, Ordering::Relaxed);
        self.studies_sent.store(0, Ordering::Relaxed);
        self.studies_unfinished.store(0, Ordering::Relaxed);
        self.instances_sent.store(0, Ordering::Relaxed);
    }

    pub fn add_instances_sent(&self, count: usize) {
        if count > 0 {
            self.instances_sent
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_study(&self, outcome: StudyOutcome) {
        match outcome {
            StudyOutcome::Sent => self.studies_sent.fetch_add(1, Ordering::Relaxed),
            _ => self.studies_unfinished.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            studies_queued: self.studies_queued.load(Ordering::Relaxed),
            studies_sent: self.studies_sent.load(Ordering::Relaxed),
            studies_unfinished: self.studies_unfinished.load(Ordering::Relaxed),
            instances_sent: self.instances_sent.load(Ordering::Relaxed),
        }
    }
}

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Flags {
    cancel_requested: bool,
    done: bool,
    /// Woken by `cancel`; replaced by `clear_cancel` so later waits start fresh
    wakeup: CancellationToken,
}

/// Lifecycle flags shared between the controlling caller and the workers.
///
/// Both flags live behind one lock. Workers observe cancellation at their
/// checkpoints; nothing is interrupted mid-transfer.
#[derive(Debug)]
pub struct RunState {
    flags: Mutex<Flags>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                cancel_requested: false,
                done: false,
                wakeup: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        // the flags stay consistent even if a holder panicked
        self.flags.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        let mut flags = self.lock();
        flags.cancel_requested = true;
        flags.wakeup.cancel();
    }

    pub fn clear_cancel(&self) {
        let mut flags = self.lock();
        flags.cancel_requested = false;
        if flags.wakeup.is_cancelled() {
            flags.wakeup = CancellationToken::new();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.lock().cancel_requested
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    pub fn set_done(&self, done: bool) {
        self.lock().done = done;
    }

    /// Sleep for `duration` unless cancellation is requested first.
    ///
    /// Returns `true` when the wait ended because of cancellation. A `cancel`
    /// wakes the wait immediately; independently of that wakeup, the flag is
    /// re-checked at least every `poll_interval`, which bounds the latency.
    pub async fn wait_unless_cancelled(&self, duration: Duration, poll_interval: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let poll_interval = poll_interval.max(Duration::from_millis(1));

        loop {
            let wakeup = {
                let flags = self.lock();
                if flags.cancel_requested {
                    return true;
                }
                flags.wakeup.clone()
            };

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = poll_interval.min(deadline - now);

            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = wakeup.cancelled() => {}
            }
        }
    }
}

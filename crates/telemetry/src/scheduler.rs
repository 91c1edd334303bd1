//! Cancellable background timers.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Stand-in start time for delays that overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Handle to a spawned timer task. Cancelling (or dropping) it guarantees the
/// task invokes its callback no further times.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub(crate) fn new(token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the task has returned, either cancelled or done.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Fires a callback after an initial delay and then at a fixed period.
///
/// Holds no lifecycle state of its own; its owner creates and cancels it.
pub struct FlushScheduler {
    initial_delay: Duration,
    period: Duration,
}

impl FlushScheduler {
    pub fn new(initial_delay: Duration, period: Duration) -> Self {
        Self {
            initial_delay,
            period,
        }
    }

    pub fn start<F>(&self, runtime: &Handle, mut on_tick: F) -> ScheduledTask
    where
        F: FnMut() + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let initial_delay = self.initial_delay;
        let period = self.period;

        let handle = runtime.spawn(async move {
            let now = tokio::time::Instant::now();
            let start = now.checked_add(initial_delay).unwrap_or_else(|| {
                warn!(?initial_delay, "flush delay out of range, timer will not fire");
                now + FAR_FUTURE
            });
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if task_token.is_cancelled() {
                    break;
                }
                debug!("flush timer fired");
                on_tick();
            }
            debug!("flush timer stopped");
        });

        ScheduledTask::new(token, handle)
    }
}

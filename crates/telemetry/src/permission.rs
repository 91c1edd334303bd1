//! Polls a runtime permission with exponential backoff until it is granted.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backoff::ExponentialBackoff;
use crate::capabilities::PermissionCheck;
use crate::scheduler::ScheduledTask;

pub struct PermissionRetryLoop {
    check: Arc<dyn PermissionCheck>,
    backoff: ExponentialBackoff,
}

impl PermissionRetryLoop {
    pub fn new(check: Arc<dyn PermissionCheck>, backoff: ExponentialBackoff) -> Self {
        Self { check, backoff }
    }

    /// Start polling. The first poll happens after the first backoff delay;
    /// `on_granted` runs at most once, on the poll that observes the grant.
    ///
    /// Cancelling the returned task prevents any further poll, including one
    /// whose delay is already running.
    pub fn start<F>(self, runtime: &Handle, on_granted: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let Self { check, mut backoff } = self;

        let handle = runtime.spawn(async move {
            loop {
                let delay = backoff.next_backoff();
                debug!(
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "waiting before next permission check"
                );
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if task_token.is_cancelled() {
                    return;
                }
                if check.is_granted() {
                    debug!(attempt = backoff.attempt(), "permission granted");
                    backoff.reset();
                    on_granted();
                    return;
                }
            }
        });

        ScheduledTask::new(token, handle)
    }
}

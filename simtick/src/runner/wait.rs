use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use crate::journal::SourceLocation;
use crate::reactive::condition::Condition;
use crate::sim::ids::RunnerId;
use crate::sim::kernel::{WaitOutcome, WeakKernel};

/// Future suspending a runner until a condition holds or a timeout elapses.
///
/// Resolves to `true` when the condition was satisfied and `false` on
/// timeout. The kernel resumes the runner; the task waker is not used.
pub(crate) struct WaitFuture {
    kernel: WeakKernel,
    runner: RunnerId,
    condition: Option<Condition>,
    timeout: Option<Duration>,
    location: SourceLocation,
    registered: bool,
}

impl WaitFuture {
    pub(crate) fn new(
        kernel: WeakKernel,
        runner: RunnerId,
        condition: Condition,
        timeout: Option<Duration>,
        location: SourceLocation,
    ) -> Self {
        Self {
            kernel,
            runner,
            condition: Some(condition),
            timeout,
            location,
            registered: false,
        }
    }
}

impl Future for WaitFuture {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<bool> {
        let this = self.get_mut();
        let Ok(kernel) = this.kernel.upgrade() else {
            return Poll::Ready(false);
        };

        if this.registered {
            return match kernel.take_wait_outcome(this.runner) {
                Some(outcome) => {
                    this.registered = false;
                    Poll::Ready(outcome == WaitOutcome::Satisfied)
                }
                None => Poll::Pending,
            };
        }

        let Some(condition) = this.condition.take() else {
            // Polled again after completion.
            return Poll::Ready(false);
        };
        match kernel.begin_wait(this.runner, condition, this.timeout, this.location) {
            Some(result) => Poll::Ready(result),
            None => {
                this.registered = true;
                Poll::Pending
            }
        }
    }
}

impl Drop for WaitFuture {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        if let Ok(kernel) = self.kernel.upgrade() {
            kernel.cancel_wait(self.runner);
        }
    }
}

//! Scrape-wide deadline derived from the inbound request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Bounded cancellation scope for one scrape.
///
/// The scope's token is a child of the request's token, so a client
/// disconnect cancels it; a timer task cancels it once the ceiling elapses.
/// Whichever happens first reaches every collector holding the token.
///
/// Dropping the deadline aborts the timer and cancels the scope, on every
/// exit path of the scrape.
#[derive(Debug)]
pub struct ScrapeDeadline {
    token: CancellationToken,
    expired: Arc<AtomicBool>,
    timer: JoinHandle<()>,
    started: Instant,
    ceiling: Duration,
}

impl ScrapeDeadline {
    /// Start the deadline now, bounded by `ceiling`.
    pub fn start(request: &CancellationToken, ceiling: Duration) -> Self {
        let token = request.child_token();
        let expired = Arc::new(AtomicBool::new(false));

        let timer = tokio::spawn({
            let token = token.clone();
            let expired = Arc::clone(&expired);
            async move {
                tokio::select! {
                    _ = tokio::time::sleep(ceiling) => {
                        expired.store(true, Ordering::Release);
                        tracing::warn!(
                            ceiling = ?ceiling,
                            "Scrape deadline exceeded, cancelling collectors"
                        );
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            }
        });

        Self {
            token,
            expired,
            timer,
            started: Instant::now(),
            ceiling,
        }
    }

    /// Token to hand to collectors.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the ceiling, as opposed to the request, ended the scope.
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Time left before the ceiling fires.
    pub fn remaining(&self) -> Duration {
        self.ceiling.saturating_sub(self.started.elapsed())
    }
}

impl Drop for ScrapeDeadline {
    fn drop(&mut self) {
        self.timer.abort();
        self.token.cancel();
    }
}

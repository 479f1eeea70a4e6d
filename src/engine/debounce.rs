use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Coalesces bursts of detail requests: only a request that is still the
/// newest after a quiet window is allowed to run, and only if it is still
/// the newest when it finishes may it publish.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    latest: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            latest: AtomicU64::new(0),
        }
    }

    /// Issues a ticket that invalidates every earlier one.
    pub fn begin(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Waits out the quiet window; `false` when a newer request arrived.
    pub async fn settle(&self, ticket: Ticket) -> bool {
        if !self.window.is_zero() {
            tokio::time::sleep(self.window).await;
        }
        self.is_current(ticket)
    }
}

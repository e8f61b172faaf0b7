//! Cancellation signaling for in-flight operations.
//!
//! Wraps a tokio watch channel into a simple cancellation pair. The
//! orchestrator checks the signal between database round trips; once a bulk
//! transfer has started, cancellation takes effect at the transfer's own
//! granularity, and the cleanup phase still runs either way.

use tokio::sync::watch;

/// Transmitter side of a cancellation channel.
pub type CancelTx = watch::Sender<bool>;

/// Receiver side of a cancellation channel, checked between round trips.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// Returns whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Creates a new cancellation channel.
///
/// The channel starts in the not-canceled state; sending `true` on the
/// transmitter requests cancellation for every signal clone.
pub fn create_cancellation() -> (CancelTx, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (tx, CancellationSignal { rx })
}

//! Cancellation signals for long running operations such as transaction
//! confirmation and log subscriptions.
//!
//! Cancelling only stops the local waiting or listening. It never affects a
//! transaction that was already broadcast.

use futures::future;
use std::sync::Arc;
use tokio::sync::watch;

/// Creates a connected pair of cancel handle and cancellation signal.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        Cancellation { rx: vec![rx] },
    )
}

/// The sending half used to request cancellation. Clones request
/// cancellation of the same signal.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests cancellation. Calling this more than once has no further
    /// effect.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a new signal connected to this handle.
    pub fn signal(&self) -> Cancellation {
        Cancellation {
            rx: vec![self.tx.subscribe()],
        }
    }
}

/// The receiving half that long running operations observe.
#[derive(Clone, Debug)]
pub struct Cancellation {
    rx: Vec<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A signal that is never cancelled.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Cancellation { rx: vec![rx] }
    }

    /// Combines two signals into one that is cancelled when either is.
    pub fn or(mut self, other: Cancellation) -> Self {
        self.rx.extend(other.rx);
        self
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.rx.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Never resolves if the handles
    /// were dropped without cancelling.
    pub async fn cancelled(&self) {
        if self.rx.is_empty() {
            return future::pending().await;
        }
        future::select_all(self.rx.iter().cloned().map(|rx| Box::pin(changed_to_true(rx)))).await;
    }
}

async fn changed_to_true(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            future::pending::<()>().await;
        }
    }
}

//! Cancellation bound to one mount of a hook instance.
//!
//! Every suspending step holds a [`LifetimeToken`] and checks it before it
//! touches state, so work that settles after teardown is discarded instead of
//! written into a cell nobody owns anymore.

use tokio::sync::watch;

/// Owner side of a mount's lifetime. Cancelled explicitly or when dropped.
#[derive(Debug)]
pub struct Lifetime {
    cancelled_tx: watch::Sender<bool>,
}

impl Lifetime {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (cancelled_tx, _) = watch::channel(false);
        Self { cancelled_tx }
    }

    pub fn token(&self) -> LifetimeToken {
        LifetimeToken {
            cancelled_rx: self.cancelled_tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled_tx.borrow()
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Cheap handle observing a [`Lifetime`].
#[derive(Debug, Clone)]
pub struct LifetimeToken {
    cancelled_rx: watch::Receiver<bool>,
}

impl LifetimeToken {
    /// True once the lifetime was cancelled or its owner is gone.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled_rx.borrow() || self.cancelled_rx.has_changed().is_err()
    }

    /// Resolves when the lifetime ends.
    pub async fn cancelled(&self) {
        let mut cancelled_rx = self.cancelled_rx.clone();
        // an error means the owner was dropped, which also ends the lifetime
        let _ = cancelled_rx.wait_for(|cancelled| *cancelled).await;
    }
}

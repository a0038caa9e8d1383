//! Concurrency gate.
//!
//! A counting limiter in front of test bodies. A permit is an RAII guard:
//! dropping it (on return, error, panic or task abort) gives the slot back,
//! so after a batch the available capacity always equals the configured
//! capacity.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Why a permit could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateClosed {
    /// The run was cancelled while waiting.
    Cancelled,
}

/// Held while a test body runs.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

/// Limits the number of concurrently running test bodies.
///
/// # Example
///
/// ```
/// use testhost_runtime::execution::ConcurrencyGate;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let gate = ConcurrencyGate::new(Some(2));
/// let cancel = CancellationToken::new();
///
/// let permit = gate.acquire(&cancel).await.unwrap();
/// assert_eq!(gate.available(), 1);
/// drop(permit);
/// assert_eq!(gate.available(), 2);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    /// Creates a gate. `None` is effectively unbounded.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        let capacity = capacity
            .map(|c| c.clamp(1, Semaphore::MAX_PERMITS))
            .unwrap_or(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot.
    ///
    /// Once `cancel` fires no new permit is handed out, even if a slot is
    /// free.
    ///
    /// # Errors
    ///
    /// [`GateClosed::Cancelled`] when `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit, GateClosed> {
        if cancel.is_cancelled() {
            return Err(GateClosed::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GateClosed::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit
                .map(|p| GatePermit { _permit: p })
                .map_err(|_| GateClosed::Cancelled),
        }
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` when no limit was configured.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.capacity == Semaphore::MAX_PERMITS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unbounded_by_default() {
        let gate = ConcurrencyGate::new(None);
        assert!(gate.is_unbounded());
        assert_eq!(gate.available(), gate.capacity());
    }

    #[tokio::test]
    async fn zero_is_clamped_to_one() {
        let gate = ConcurrencyGate::new(Some(0));
        assert_eq!(gate.capacity(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_refuses_free_slot() {
        let gate = ConcurrencyGate::new(Some(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(gate.acquire(&cancel).await.unwrap_err(), GateClosed::Cancelled);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn cancel_unblocks_waiter() {
        let gate = ConcurrencyGate::new(Some(1));
        let cancel = CancellationToken::new();
        let _held = gate.acquire(&cancel).await.unwrap();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire(&cancel).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(GateClosed::Cancelled));
    }

    #[tokio::test]
    async fn permit_released_on_panic() {
        let gate = ConcurrencyGate::new(Some(1));
        let cancel = CancellationToken::new();
        let permit = gate.acquire(&cancel).await.unwrap();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("body blew up");
        });
        assert!(handle.await.is_err());
        assert_eq!(gate.available(), 1);
    }
}

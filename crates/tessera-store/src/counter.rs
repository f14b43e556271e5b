//! Progress counters and cooperative cancellation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Result, StoreError};

/// Progress sink. Implementations must tolerate concurrent `add`.
pub trait Counter: Send + Sync {
    fn add(&self, delta: u64);
}

/// Counter that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCounter;

impl Counter for NoopCounter {
    fn add(&self, _delta: u64) {}
}

/// Counter accumulating into an atomic
#[derive(Debug, Default)]
pub struct ByteCounter {
    total: AtomicU64,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Counter for ByteCounter {
    fn add(&self, delta: u64) {
        self.total.fetch_add(delta, Ordering::Relaxed);
    }
}

/// Shared cancellation flag.
///
/// Clones observe the same flag. Long operations poll it between files and
/// between stream chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_byte_counter_concurrent() {
        let counter = Arc::new(ByteCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        c.add(3);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.get(), 12_000);
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(StoreError::Cancelled)));
    }
}

//! Cooperative cancellation for working-copy traversals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::WcError;

/// A cloneable flag polled by the driver between per-path operations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Operations already applied stay applied.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(WcError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), WcError> {
        if self.is_cancelled() {
            Err(WcError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(WcError::Cancelled)));
    }
}

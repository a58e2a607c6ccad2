//! Exclusive per-root lock held for the duration of a traversal.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::errors::WcError;

/// RAII guard for the working-copy root lock. Dropping it releases the lock.
pub struct WcLockGuard<'a> {
    db: &'a Database,
    owner: String,
}

impl<'a> WcLockGuard<'a> {
    /// Take the lock or fail with [`WcError::Locked`] naming the holder.
    pub(crate) fn acquire(db: &'a Database, root: &str) -> Result<Self, WcError> {
        let owner = Uuid::new_v4().to_string();
        if let Some(holder) = db.acquire_wc_lock(&owner)? {
            return Err(WcError::Locked {
                root: root.to_string(),
                owner: holder.owner,
                acquired_at: holder.acquired_at,
            });
        }
        debug!(root, owner = %owner, "working-copy lock taken");
        Ok(Self { db, owner })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for WcLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.db.release_wc_lock(&self.owner) {
            warn!(owner = %self.owner, error = %e, "failed to release working-copy lock");
        }
    }
}

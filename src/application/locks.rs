use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::LedgerId;

use super::AppError;

type LockMap = DashMap<LedgerId, Arc<Mutex<()>>>;

/// One async mutex per ledger, so mutations of a ledger run one at a time
/// while different ledgers proceed in parallel.
///
/// Waiters are served in FIFO order (tokio's mutex is fair) and give up after
/// `timeout`. An entry lives only while someone holds or waits for it.
pub struct LedgerLocks {
    locks: Arc<LockMap>,
    timeout: Duration,
}

/// Exclusive access to one ledger. Releasing it drops the map entry once
/// nobody else is queued on it.
pub struct LedgerGuard {
    ledger_id: LedgerId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl LedgerLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Wait for exclusive access to `ledger_id`. The guard releases on drop.
    pub async fn acquire(&self, ledger_id: LedgerId) -> Result<LedgerGuard, AppError> {
        // Clone the Arc out so the map shard isn't held across the await
        let lock = Arc::clone(&self.locks.entry(ledger_id).or_default());

        let acquired = tokio::time::timeout(self.timeout, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(LedgerGuard {
                ledger_id,
                guard: Some(guard),
                locks: Arc::clone(&self.locks),
            }),
            Err(_) => {
                prune(&self.locks, ledger_id);
                tracing::warn!(%ledger_id, timeout = ?self.timeout, "timed out waiting for ledger lock");
                Err(AppError::LedgerBusy(ledger_id))
            }
        }
    }

    /// Number of ledgers currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        // Unlock first so the only remaining handle is the map's own
        drop(self.guard.take());
        prune(&self.locks, self.ledger_id);
    }
}

/// Remove the entry if the map holds the last handle to it. `remove_if` runs
/// under the shard lock, so no `acquire` can clone it in between.
fn prune(locks: &LockMap, ledger_id: LedgerId) {
    locks.remove_if(&ledger_id, |_, lock| Arc::strong_count(lock) == 1);
}

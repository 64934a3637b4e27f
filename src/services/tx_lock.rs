//! Per-wallet transaction lock
//!
//! Serializes mutating transactions from the same sender so two in-flight
//! transactions never race for a nonce. Operations on different wallets are
//! independent. Each call registers a slot for its wallet before it starts
//! waiting, so later callers queue behind it in arrival order.

use alloy::primitives::Address;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

/// Resolves once the registered operation and everything queued before it have
/// settled. `Some(true)` on success, `Some(false)` on error, `None` if the
/// operation was dropped.
type Settled = Shared<BoxFuture<'static, Option<bool>>>;

struct PendingSlot {
    id: u64,
    settled: Settled,
}

/// Per-wallet FIFO lock for mutating chain operations.
///
/// Not reentrant: an operation running under `with_lock(w, ..)` must not call
/// `with_lock(w, ..)` again, it would wait for itself.
#[derive(Default)]
pub struct TransactionLock {
    pending: Mutex<HashMap<Address, PendingSlot>>,
    next_id: AtomicU64,
}

impl TransactionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` once every operation queued earlier for `wallet` has settled.
    ///
    /// The predecessor's outcome is discarded: the caller only needs ordering.
    /// `op`'s own result is returned unchanged.
    pub async fn with_lock<T, E, F, Fut>(&self, wallet: Address, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (mut guard, predecessor) = self.register(wallet);

        if let Some(predecessor) = predecessor {
            match predecessor.await {
                Some(true) => {}
                Some(false) => debug!(
                    "[TxLock] Previous transaction for {} failed, continuing",
                    wallet
                ),
                None => debug!(
                    "[TxLock] Previous transaction for {} was dropped, continuing",
                    wallet
                ),
            }
        }

        guard.started = true;
        let result = op().await;
        guard.settle(result.is_ok());
        result
    }

    /// Insert our slot and hand back whatever was pending before us.
    fn register(&self, wallet: Address) -> (SlotGuard<'_>, Option<Settled>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let predecessor = pending.get(&wallet).map(|slot| slot.settled.clone());

        // A slot dropped while still queued must not let its successor overtake
        // the operations ahead of it.
        let ahead = predecessor.clone();
        let settled = async move {
            if let Some(ahead) = ahead {
                ahead.await;
            }
            rx.await.ok()
        }
        .boxed()
        .shared();
        pending.insert(wallet, PendingSlot { id, settled });
        drop(pending);

        let guard = SlotGuard {
            lock: self,
            wallet,
            id,
            started: false,
            done: Some(tx),
        };
        (guard, predecessor)
    }

    /// Compare-and-delete: only remove the slot if it is still ours.
    fn release(&self, wallet: Address, id: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(&wallet).is_some_and(|slot| slot.id == id) {
            pending.remove(&wallet);
        }
    }

    #[cfg(test)]
    fn pending_id(&self, wallet: Address) -> Option<u64> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&wallet)
            .map(|slot| slot.id)
    }
}

/// Releases the slot on settlement, including when the future is dropped.
///
/// A slot dropped before its operation started stays registered: its settled
/// signal still waits on the operations queued ahead of it, and the next caller
/// replaces it.
struct SlotGuard<'a> {
    lock: &'a TransactionLock,
    wallet: Address,
    id: u64,
    started: bool,
    done: Option<oneshot::Sender<bool>>,
}

impl SlotGuard<'_> {
    fn settle(mut self, ok: bool) {
        if let Some(done) = self.done.take() {
            let _ = done.send(ok);
        }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.started {
            self.lock.release(self.wallet, self.id);
        }
        // An unsent sender reads as "dropped" to successors
        self.done.take();
    }
}

//! Fire-and-forget write-through for cart snapshots.
//!
//! Mutations hand the serialized cart to [`CartPersister::enqueue`], which
//! never blocks and never fails from the caller's point of view. Pending
//! writes live in a map holding the latest payload per slot: a newer snapshot
//! replaces an unwritten older one, so intermediate states may be skipped but
//! the last one always reaches [`CartStorage`]. A single background writer
//! takes everything pending, in order of each slot's first enqueue, and
//! writes it.
//!
//! Dropping every `CartPersister` handle closes the persister; the writer
//! flushes what is left and exits, so awaiting its `JoinHandle` is a final
//! flush.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use green_basket_core::CartSnapshot;

use super::storage::CartStorage;

#[derive(Debug)]
struct PersistJob {
    slot: String,
    payload: String,
}

#[derive(Debug, Default)]
struct Pending {
    order: VecDeque<String>,
    payloads: HashMap<String, String>,
    closed: bool,
}

impl Pending {
    /// Record `payload` as the next write for `slot`, replacing any unwritten one.
    fn put(&mut self, slot: &str, payload: String) {
        if self.payloads.insert(slot.to_owned(), payload).is_some() {
            debug!(slot, "superseding unwritten cart snapshot");
        } else {
            self.order.push_back(slot.to_owned());
        }
    }

    fn take(&mut self) -> Vec<PersistJob> {
        self.order
            .drain(..)
            .filter_map(|slot| {
                self.payloads
                    .remove(&slot)
                    .map(|payload| PersistJob { slot, payload })
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<Pending>,
    wake: Notify,
}

impl Shared {
    // Critical sections never panic; a poisoned lock still holds valid data.
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Closes the persister once the last handle is gone.
#[derive(Debug)]
struct CloseOnDrop(Arc<Shared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.lock().closed = true;
        self.0.wake.notify_one();
    }
}

/// Handle for scheduling cart writes.
#[derive(Debug, Clone)]
pub struct CartPersister {
    shared: Arc<Shared>,
    _close: Arc<CloseOnDrop>,
}

impl CartPersister {
    /// Spawn the writer task over `storage`.
    #[must_use]
    pub fn spawn(storage: Arc<dyn CartStorage>) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(Shared::default());
        let handle = tokio::spawn(run_writer(storage, Arc::clone(&shared)));
        let persister = Self {
            _close: Arc::new(CloseOnDrop(Arc::clone(&shared))),
            shared,
        };
        (persister, handle)
    }

    /// Best-effort, non-blocking enqueue of a snapshot for `slot`.
    pub fn enqueue(&self, slot: &str, snapshot: &CartSnapshot) {
        let payload = match snapshot.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(slot, error = %e, "failed to serialize cart snapshot");
                return;
            }
        };

        self.shared.lock().put(slot, payload);
        self.shared.wake.notify_one();
    }
}

async fn run_writer(storage: Arc<dyn CartStorage>, shared: Arc<Shared>) {
    loop {
        let (batch, closed) = {
            let mut pending = shared.lock();
            (pending.take(), pending.closed)
        };

        if batch.is_empty() {
            if closed {
                break;
            }
            // A notify sent before this point leaves a permit, so none is lost
            shared.wake.notified().await;
            continue;
        }

        for job in batch {
            if let Err(e) = storage.store(&job.slot, &job.payload).await {
                warn!(slot = %job.slot, error = %e, "cart write-through failed");
            } else {
                debug!(slot = %job.slot, "cart persisted");
            }
        }
    }
    debug!("cart persister stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use green_basket_core::{CartLineItem, CartState, Price, ProductId};
    use tokio::sync::Semaphore;

    use super::*;
    use crate::cart::storage::{MemoryCartStorage, StorageError};

    fn snapshot_with(quantity: u32) -> CartSnapshot {
        let mut cart = CartState::new();
        cart.add_product(CartLineItem {
            id: ProductId::parse("p1").unwrap(),
            name: "Apples".to_owned(),
            unit_price: Price::from_minor(500),
            image_url: None,
            quantity,
        });
        cart.snapshot()
    }

    #[test]
    fn test_pending_keeps_latest_per_slot() {
        let mut pending = Pending::default();
        pending.put("a", "1".to_owned());
        pending.put("b", "1".to_owned());
        pending.put("a", "2".to_owned());
        pending.put("a", "3".to_owned());

        let jobs = pending.take();
        let pairs: Vec<_> = jobs
            .iter()
            .map(|j| (j.slot.as_str(), j.payload.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "1")]);
        assert!(pending.take().is_empty());
    }

    #[tokio::test]
    async fn test_drop_flushes_latest_snapshot() {
        let storage = Arc::new(MemoryCartStorage::new());
        let (persister, handle) = CartPersister::spawn(storage.clone());

        persister.enqueue("cart", &snapshot_with(1));
        persister.enqueue("cart", &snapshot_with(2));
        drop(persister);
        handle.await.unwrap();

        let stored = CartSnapshot::from_json(&storage.get("cart").await.unwrap()).unwrap();
        assert_eq!(stored.products()[0].quantity, 2);
    }

    /// Memory storage whose writes wait until the gate is opened.
    struct GatedStorage {
        inner: MemoryCartStorage,
        gate: Semaphore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl CartStorage for GatedStorage {
        async fn load(&self, slot: &str) -> Result<Option<String>, StorageError> {
            self.inner.load(slot).await
        }

        async fn store(&self, slot: &str, payload: &str) -> Result<(), StorageError> {
            let _permit = self.gate.acquire().await.unwrap();
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.store(slot, payload).await
        }
    }

    #[tokio::test]
    async fn test_latest_snapshot_survives_a_stalled_writer() {
        let storage = Arc::new(GatedStorage {
            inner: MemoryCartStorage::new(),
            gate: Semaphore::new(0),
            writes: AtomicUsize::new(0),
        });
        let (persister, handle) = CartPersister::spawn(storage.clone());

        // The writer picks up the first snapshot and stalls on it.
        persister.enqueue("cart", &snapshot_with(1));
        tokio::task::yield_now().await;
        for quantity in 2..=50 {
            persister.enqueue("cart", &snapshot_with(quantity));
            persister.enqueue(&format!("other-{quantity}"), &snapshot_with(quantity));
        }

        storage.gate.add_permits(1_000);
        drop(persister);
        handle.await.unwrap();

        let stored = CartSnapshot::from_json(&storage.inner.get("cart").await.unwrap()).unwrap();
        assert_eq!(stored.products()[0].quantity, 50);
        let other = CartSnapshot::from_json(&storage.inner.get("other-50").await.unwrap()).unwrap();
        assert_eq!(other.products()[0].quantity, 50);
        // At most the stalled write, the final "cart" and one per other slot.
        assert!(storage.writes.load(Ordering::SeqCst) <= 51);
    }

    #[tokio::test]
    async fn test_clones_keep_the_writer_open() {
        let storage = Arc::new(MemoryCartStorage::new());
        let (persister, handle) = CartPersister::spawn(storage.clone());
        let clone = persister.clone();

        drop(persister);
        clone.enqueue("cart", &snapshot_with(3));
        drop(clone);
        handle.await.unwrap();

        let stored = CartSnapshot::from_json(&storage.get("cart").await.unwrap()).unwrap();
        assert_eq!(stored.products()[0].quantity, 3);
    }

    struct FailingStorage;

    #[async_trait]
    impl CartStorage for FailingStorage {
        async fn load(&self, _slot: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        async fn store(&self, slot: &str, _payload: &str) -> Result<(), StorageError> {
            Err(StorageError::InvalidSlot(slot.to_owned()))
        }
    }

    #[tokio::test]
    async fn test_write_failures_are_swallowed() {
        let (persister, handle) = CartPersister::spawn(Arc::new(FailingStorage));
        persister.enqueue("cart", &snapshot_with(1));
        persister.enqueue("cart", &snapshot_with(2));
        drop(persister);
        handle.await.unwrap();
    }
}

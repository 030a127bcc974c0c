use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-order async mutexes. Every read-modify-write of an order (state
/// transitions, driver responses, settlement runs) holds the order's lock
/// for its full critical section, so concurrent operations on the same
/// order serialize while different orders proceed in parallel.
pub struct OrderLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for one order, creating its slot on first use.
    /// The guard is owned so callers can hold it across awaits.
    pub async fn acquire(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            if map.len() > 4096 {
                // uncontended slots are only referenced by the map itself
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(order_id).or_default().clone()
        };
        slot.lock_owned().await
    }
}

impl Default for OrderLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_order_serializes_critical_sections() {
        let locks = Arc::new(OrderLocks::new());
        let order_id = Uuid::new_v4();
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(order_id).await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_orders_do_not_block_each_other() {
        let locks = OrderLocks::new();
        let first = locks.acquire(Uuid::new_v4()).await;
        // acquiring a second order's lock must not wait on the first
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(Uuid::new_v4()),
        )
        .await;
        assert!(second.is_ok());
        drop(first);
    }
}

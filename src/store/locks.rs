//! Per-row async locks.
//!
//! Ledger writes take the lock for every row they read-check-write, always
//! order before product. Locks are taken before a pooled connection is
//! acquired and are never held across a network call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use crate::domain::value_objects::{OrderId, ProductId};

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowKey {
    Product(ProductId),
    Order(OrderId),
}

#[derive(Default)]
pub struct RowLocks {
    slots: Mutex<HashMap<RowKey, Arc<AsyncMutex<()>>>>,
}

impl RowLocks {
    pub fn new() -> Self { Self::default() }

    pub async fn lock(&self, key: RowKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle slot.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(key).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize { self.slots.lock().unwrap_or_else(PoisonError::into_inner).len() }
}

//! Per-resource locks
//!
//! At most one list/diff/apply cycle runs per resource inside a process.
//! Different resources never block each other.

use crate::action::ResourceKind;
use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Who holds a resource lock and since when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

type ResourceKey = (ResourceKind, String);
type SlotTable = Arc<Mutex<HashMap<ResourceKey, Slot>>>;

/// References to an idle slot's mutex: the table entry, the guard and the
/// guard's mutex guard.
const IDLE_SLOT_REFS: usize = 3;

#[derive(Clone, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    info: Arc<Mutex<Option<LockInfo>>>,
}

/// Lock table keyed by resource kind and id
#[derive(Clone, Default)]
pub struct ResourceLocks {
    slots: SlotTable,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: ResourceKind, resource_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry((kind, resource_id.to_string()))
            .or_default()
            .clone()
    }

    /// Wait until the resource is free and lock it.
    pub async fn acquire(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        holder: &str,
    ) -> ResourceGuard {
        let slot = self.slot(kind, resource_id);
        let guard = slot.mutex.clone().lock_owned().await;
        ResourceGuard::new(&self.slots, kind, resource_id, holder, slot, guard)
    }

    /// Lock the resource, failing immediately if someone else holds it.
    pub fn try_acquire(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        holder: &str,
    ) -> Result<ResourceGuard> {
        let slot = self.slot(kind, resource_id);
        match slot.mutex.clone().try_lock_owned() {
            Ok(guard) => Ok(ResourceGuard::new(
                &self.slots,
                kind,
                resource_id,
                holder,
                slot,
                guard,
            )),
            Err(_) => {
                let held_by = slot
                    .info
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                Err(CloudError::LockError(match held_by {
                    Some(info) => format!(
                        "{} {} is locked by {} since {}",
                        kind, resource_id, info.holder, info.acquired_at
                    ),
                    None => format!("{} {} is locked", kind, resource_id),
                }))
            }
        }
    }

    /// Number of resources with a slot in the table
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current holder of a resource lock, if any
    pub fn holder(&self, kind: ResourceKind, resource_id: &str) -> Option<LockInfo> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&(kind, resource_id.to_string()))
            .and_then(|slot| slot.info.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// RAII guard for a resource lock
///
/// Dropping the last guard of a resource nobody waits for removes its slot
/// from the table.
pub struct ResourceGuard {
    kind: ResourceKind,
    resource_id: String,
    info: Arc<Mutex<Option<LockInfo>>>,
    slots: SlotTable,
    mutex: Arc<AsyncMutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl ResourceGuard {
    fn new(
        slots: &SlotTable,
        kind: ResourceKind,
        resource_id: &str,
        holder: &str,
        slot: Slot,
        guard: OwnedMutexGuard<()>,
    ) -> Self {
        *slot.info.lock().unwrap_or_else(PoisonError::into_inner) = Some(LockInfo {
            holder: holder.to_string(),
            acquired_at: Utc::now(),
        });
        tracing::debug!("Acquired lock on {} {}", kind, resource_id);
        Self {
            kind,
            resource_id: resource_id.to_string(),
            info: slot.info,
            slots: Arc::clone(slots),
            mutex: slot.mutex,
            _guard: guard,
        }
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        // Runs before `_guard` releases the mutex.
        *self.info.lock().unwrap_or_else(PoisonError::into_inner) = None;

        // Every waiter cloned the slot under the table lock, so it shows in
        // the count.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (self.kind, self.resource_id.clone());
        let idle = slots.get(&key).is_some_and(|slot| {
            Arc::ptr_eq(&slot.mutex, &self.mutex)
                && Arc::strong_count(&self.mutex) == IDLE_SLOT_REFS
        });
        if idle {
            slots.remove(&key);
        }
        tracing::debug!("Released lock on {} {}", self.kind, self.resource_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_try_acquire_contention() {
        let locks = ResourceLocks::new();
        let guard = locks
            .try_acquire(ResourceKind::SecurityGroup, "sg-1", "worker-a")
            .unwrap();
        assert_eq!(
            locks
                .holder(ResourceKind::SecurityGroup, "sg-1")
                .map(|i| i.holder),
            Some("worker-a".to_string())
        );

        let err = locks
            .try_acquire(ResourceKind::SecurityGroup, "sg-1", "worker-b")
            .err()
            .unwrap();
        assert!(err.to_string().contains("locked by worker-a"));

        // Same id, other kind: independent
        assert!(
            locks
                .try_acquire(ResourceKind::DnsZone, "sg-1", "worker-b")
                .is_ok()
        );

        drop(guard);
        assert!(locks.holder(ResourceKind::SecurityGroup, "sg-1").is_none());
        assert!(
            locks
                .try_acquire(ResourceKind::SecurityGroup, "sg-1", "worker-b")
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let locks = ResourceLocks::new();
        let guard = locks
            .acquire(ResourceKind::AccessGroup, "ag-1", "first")
            .await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire(ResourceKind::AccessGroup, "ag-1", "second").await;
                let holder = locks
                    .holder(ResourceKind::AccessGroup, "ag-1")
                    .map(|i| i.holder);
                drop(guard);
                holder
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);

        assert_eq!(waiter.await.unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_released_slots_are_pruned() {
        let locks = ResourceLocks::new();
        let guard = locks.acquire(ResourceKind::DnsZone, "example.com", "a").await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());

        for i in 0..50 {
            let id = format!("sg-{}", i);
            let guard = locks
                .try_acquire(ResourceKind::SecurityGroup, &id, "a")
                .unwrap();
            drop(guard);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_slot_kept_while_waiter_queued() {
        let locks = ResourceLocks::new();
        let guard = locks.acquire(ResourceKind::SecurityGroup, "sg-1", "first").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(ResourceKind::SecurityGroup, "sg-1", "second").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}

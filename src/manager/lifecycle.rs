use super::{Manager, StoreEntry};
use crate::events::StoreEventKind;
use crate::store::{StoreMap, StoreStatus, Teardown};
use std::sync::atomic::Ordering;

impl Manager {
    /// Mount the stores of one scope.
    ///
    /// Every store moves to `in-use` and its mount hook runs. The returned
    /// teardown releases this mount: hook teardowns run and non-global stores
    /// whose last owner left become `unused`, which schedules eviction. It is
    /// safe to run even if some stores were evicted in between.
    pub fn mount_stores(&self, stores: &StoreMap) -> Teardown {
        let remove_init_state = self.options().should_remove_init_state;
        let mut teardowns: Vec<Teardown> = Vec::new();

        for (_, store) in stores.iter() {
            let global = {
                let mut registry = self.registry();
                let Some(entry) = registry.stores.get_mut(store.id()) else {
                    tracing::debug!(store_id = store.id(), "mount skipped, store was evicted");
                    continue;
                };
                entry.mounts += 1;
                self.transition(entry, StoreStatus::InUse);
                let global = entry.meta.global;

                if remove_init_state {
                    registry.init_state.remove(store.id());
                }
                global
            };

            if !global {
                let manager = self.downgrade();
                let store_id = store.id().to_string();
                teardowns.push(Box::new(move || {
                    if let Some(manager) = manager.upgrade() {
                        manager.release(&store_id);
                    }
                }));
            }

            if let Some(teardown) = store.on_mount() {
                teardowns.push(teardown);
            }
            self.publish(StoreEventKind::Mounted, store.clone());
        }

        Box::new(move || {
            for teardown in teardowns.into_iter().rev() {
                teardown();
            }
        })
    }

    /// Mark stores handed to a child render before their owner mounted.
    pub fn touch_stores(&self, stores: &StoreMap) {
        let mut registry = self.registry();
        for (_, store) in stores.iter() {
            let Some(entry) = registry.stores.get_mut(store.id()) else {
                continue;
            };
            if entry.meta.status == StoreStatus::Init && !entry.meta.global {
                self.transition(entry, StoreStatus::Touched);
            }
        }
    }

    /// Evict a store now, regardless of its status.
    pub fn evict_store(&self, store_id: &str) -> bool {
        self.evict(store_id, None)
    }

    fn release(&self, store_id: &str) {
        let store = {
            let mut registry = self.registry();
            let Some(entry) = registry.stores.get_mut(store_id) else {
                return;
            };
            entry.mounts = entry.mounts.saturating_sub(1);
            if entry.mounts > 0 || entry.meta.global {
                return;
            }
            self.transition(entry, StoreStatus::Unused);
            entry.store.clone()
        };
        self.publish(StoreEventKind::Unmounted, store);
    }

    /// Enter `status`, cancelling any pending eviction and scheduling a new
    /// one when the status has a delay configured.
    pub(super) fn transition(&self, entry: &mut StoreEntry, status: StoreStatus) {
        entry.meta.status = status;
        entry.generation += 1;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }

        let Some(delay) = self.options().destroy_timers.delay(status) else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            if !self.inner.runtime_warned.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    store_id = %entry.meta.id,
                    "no async runtime, stores of this manager are not evicted automatically"
                );
            }
            tracing::debug!(store_id = %entry.meta.id, %status, "eviction not scheduled");
            return;
        };

        let manager = self.downgrade();
        let store_id = entry.meta.id.clone();
        let generation = entry.generation;
        let deadline = tokio::time::Instant::now() + delay;

        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(manager) = manager.upgrade() {
                manager.evict(&store_id, Some(generation));
            }
        });
        entry.timer = Some(task.abort_handle());
    }

    /// Remove a store from the registry. With a generation, only evicts when
    /// no status change happened since the timer was scheduled.
    fn evict(&self, store_id: &str, generation: Option<u64>) -> bool {
        let mut entry = {
            let mut guard = self.registry();
            let registry = &mut *guard;

            let current = registry.stores.get(store_id).map(|e| e.generation);
            match (current, generation) {
                (None, _) => return false,
                (Some(current), Some(expected)) if current != expected => return false,
                _ => {}
            }
            let Some(entry) = registry.stores.remove(store_id) else {
                return false;
            };

            if registry.scopes.unregister(store_id, &entry.meta.scope_id) {
                tracing::trace!(scope_id = %entry.meta.scope_id, "scope pruned");
            }
            if let Some(ids) = registry.suspense.get_mut(&entry.meta.suspense_id) {
                ids.shift_remove(store_id);
                if ids.is_empty() {
                    registry.suspense.remove(&entry.meta.suspense_id);
                }
            }
            entry
        };

        if generation.is_none() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
        drop(entry.change_listener.take());
        entry.store.on_destroy();

        tracing::debug!(%store_id, status = %entry.meta.status, "store evicted");
        self.publish(StoreEventKind::Deleted, entry.store);
        true
    }
}

use crate::error::Result;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Subscribers<T> = RwLock<Vec<(u64, Subscriber<T>)>>;

/// The observable surface of a store.
///
/// The manager only sees a store's state through this trait: it snapshots it
/// for serialization, restores persisted or streamed data into it during
/// wakeup, and watches it to re-persist on change.
pub trait Observable: Send + Sync {
    /// Plain JSON snapshot of the observable fields.
    fn snapshot(&self) -> Value;

    /// Replace the observable fields from a snapshot.
    fn restore(&self, value: Value) -> Result<()>;

    /// Call `on_change` after every change until the subscription is dropped.
    fn watch(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription;
}

/// A thread-safe observable state cell.
///
/// Stores keep the fields that should be serialized, persisted and restored
/// inside a `State<T>`; anything outside of it is private to the store.
pub struct State<T> {
    value: Arc<RwLock<T>>,
    subscribers: Arc<Subscribers<T>>,
    next_id: Arc<AtomicU64>,
}

impl<T: Clone> State<T> {
    /// Create a new state cell with the given initial value.
    pub fn new(initial: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial)),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        {
            let mut value = self.value.write();
            f(&mut *value);
        }
        self.notify();
    }

    /// Set a new value.
    pub fn set(&self, new_value: T) {
        *self.value.write() = new_value;
        self.notify();
    }

    /// Read the value without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&*self.value.read())
    }

    /// Subscribe to changes. The callback runs after every update until the
    /// returned subscription is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push((id, Arc::new(callback)));

        let subscribers: Weak<Subscribers<T>> = Arc::downgrade(&self.subscribers);
        Subscription::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.write().retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn notify(&self) {
        let value = self.get();
        // Subscribers may read or update the cell, so no lock is held while
        // they run.
        let subscribers: Vec<Subscriber<T>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, sub)| Arc::clone(sub))
            .collect();
        for subscriber in subscribers {
            subscriber(&value);
        }
    }
}

impl<T: Clone> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T: Clone + Default> Default for State<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Observable for State<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn snapshot(&self) -> Value {
        match serde_json::to_value(&*self.value.read()) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "failed to snapshot store state");
                Value::Null
            }
        }
    }

    fn restore(&self, value: Value) -> Result<()> {
        let restored: T = serde_json::from_value(value)?;
        self.set(restored);
        Ok(())
    }

    fn watch(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.subscribe(move |_| on_change())
    }
}

/// RAII guard for a change subscription.
///
/// Dropping the guard (or calling [`Subscription::unsubscribe`]) detaches the
/// callback.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap a detach action.
    pub fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach now.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        count: usize,
        name: String,
    }

    fn profile() -> State<Profile> {
        State::new(Profile {
            count: 0,
            name: "test".to_string(),
        })
    }

    #[test]
    fn state_get_set() {
        let state = profile();
        assert_eq!(state.get().count, 0);

        state.set(Profile {
            count: 42,
            name: "updated".to_string(),
        });

        assert_eq!(state.get().count, 42);
        assert_eq!(state.get().name, "updated");
    }

    #[test]
    fn state_subscribe_until_dropped() {
        let state = profile();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let subscription = state.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.update(|p| p.count += 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        drop(subscription);
        assert_eq!(state.subscriber_count(), 0);

        state.update(|p| p.count += 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_and_restore() {
        let state = profile();
        assert_eq!(state.snapshot(), json!({ "count": 0, "name": "test" }));

        state
            .restore(json!({ "count": 7, "name": "restored" }))
            .unwrap();
        assert_eq!(state.get().count, 7);
    }

    #[test]
    fn restore_rejects_wrong_shape() {
        let state = profile();
        assert!(state.restore(json!({ "count": "seven" })).is_err());
        assert_eq!(state.get().count, 0);
    }

    #[test]
    fn watch_fires_on_restore() {
        let state = profile();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let _guard = state.watch(Box::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        state.restore(json!({ "count": 1, "name": "x" })).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

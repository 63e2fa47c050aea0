use super::merge::deep_merge;
use crate::manager::Manager;
use crate::store::{Observable, Store, Subscription, WakeupState};
use serde_json::{Map, Value};

/// Default wakeup: persisted state as the base, init state on top, merged into
/// the store's current observable state.
///
/// Returns `true` when the init state added something the storage backend
/// does not have yet.
pub fn wakeup<S: Store + ?Sized>(store: &S, state: WakeupState) -> bool {
    let WakeupState {
        init_state,
        persisted_state,
    } = state;

    let mut restored = Value::Object(Map::new());
    if let Some(persisted) = &persisted_state {
        if !deep_merge(&mut restored, persisted) && !persisted.is_object() {
            restored = persisted.clone();
        }
    }

    let should_save = match &init_state {
        Some(init) if restored.is_object() && init.is_object() => deep_merge(&mut restored, init),
        Some(init) => {
            let changed = &restored != init;
            restored = init.clone();
            changed
        }
        None => false,
    };

    if let Some(observable) = store.observable() {
        restore_best_effort(observable, &restored);
    }
    should_save
}

/// Apply bootstrap state to a store that is not persisted.
pub(crate) fn restore_init_state(store: &dyn Store, init_state: &Value) {
    if let Some(observable) = store.observable() {
        restore_best_effort(observable, init_state);
    }
}

/// Merge `patch` into the observable state.
///
/// When the merged state does not deserialize, fields are applied one at a
/// time and those that do not fit are skipped.
pub(crate) fn restore_best_effort(observable: &dyn Observable, patch: &Value) -> bool {
    let mut merged = observable.snapshot();

    if !merged.is_object() || !patch.is_object() {
        if merged == *patch || patch.as_object().is_some_and(Map::is_empty) {
            return false;
        }
        return match observable.restore(patch.clone()) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "restored state does not fit the store, ignored");
                false
            }
        };
    }

    if !deep_merge(&mut merged, patch) {
        return false;
    }

    let Err(error) = observable.restore(merged) else {
        return true;
    };
    tracing::warn!(%error, "restored state does not fit the store, merging field by field");

    let mut applied = false;
    for (key, value) in patch.as_object().into_iter().flatten() {
        let mut candidate = observable.snapshot();
        let field = Value::Object(Map::from_iter([(key.clone(), value.clone())]));
        if !deep_merge(&mut candidate, &field) {
            continue;
        }
        match observable.restore(candidate) {
            Ok(()) => applied = true,
            Err(error) => tracing::debug!(field = %key, %error, "field skipped during restore"),
        }
    }
    applied
}

/// Default change tracking: every change of the observable surface saves all
/// persisted stores in the background.
///
/// Returns `None` when persistence is disabled, no storage is configured or
/// the store has no observable surface.
pub fn on_change_listener<S: Store + ?Sized>(store: &S, manager: &Manager) -> Option<Subscription> {
    if manager.options().should_disable_persist || manager.storage().is_none() {
        return None;
    }

    let observable = store.observable()?;
    let manager = manager.downgrade();
    Some(observable.watch(Box::new(move || {
        if let Some(manager) = manager.upgrade() {
            manager.spawn_save();
        }
    })))
}

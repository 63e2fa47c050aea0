use super::identity::{resolve_store_id, strip_scope_qualifier};
use super::{Manager, StoreEntry, StoreMeta};
use crate::error::StoreError;
use crate::events::StoreEventKind;
use crate::persist;
use crate::scope::{Lookup, GLOBAL_SCOPE, ROOT_SCOPE};
use crate::store::{
    ScopeParams, Store, StoreClass, StoreContext, StoreDef, StoreMap, StoreParams, StoreRef,
    StoreStatus, StoreType, WakeupState,
};
use serde_json::Value;
use std::sync::Arc;

/// Where and for whom a store is being created.
struct Placement {
    id: String,
    scope_id: String,
    parent_scope_id: String,
    suspense_id: String,
    component_name: String,
    component_props: Value,
}

impl Placement {
    fn global(id: String) -> Self {
        Self {
            id,
            scope_id: GLOBAL_SCOPE.to_string(),
            parent_scope_id: ROOT_SCOPE.to_string(),
            suspense_id: String::new(),
            component_name: String::new(),
            component_props: Value::Null,
        }
    }

    fn scoped(id: String, scope: &ScopeParams) -> Self {
        let parent_scope_id = if scope.parent_scope_id.is_empty()
            || scope.parent_scope_id == scope.scope_id
        {
            ROOT_SCOPE.to_string()
        } else {
            scope.parent_scope_id.clone()
        };

        Self {
            id,
            scope_id: scope.scope_id.clone(),
            parent_scope_id,
            suspense_id: scope.suspense_id.clone(),
            component_name: scope.component_name.clone(),
            component_props: scope.component_props.clone(),
        }
    }
}

impl Manager {
    /// Get an existing store.
    ///
    /// Global stores are created on first request. Other stores are never
    /// created here: when the resolved id is not live, the request's scope
    /// chain is searched for a single store of the same type.
    pub fn get_store<S: Store>(
        &self,
        store_type: &StoreType<S>,
        params: StoreParams,
    ) -> Option<Arc<S>> {
        let store = self.get_store_ref(store_type.class(), &params)?;
        let typed = store.downcast::<S>();
        if typed.is_none() {
            tracing::error!(store_id = store.id(), "store is registered with a different type");
        }
        typed
    }

    pub(crate) fn get_store_ref(
        &self,
        class: &StoreClass,
        params: &StoreParams,
    ) -> Option<StoreRef> {
        let store_id = resolve_store_id(class, params);

        if let Some(entry) = self.registry().stores.get(&store_id) {
            return Some(entry.store.clone());
        }

        if class.global {
            return Some(self.create_store(class, Placement::global(store_id)));
        }

        self.lookup_store(&store_id, params)
    }

    fn lookup_store(&self, store_id: &str, params: &StoreParams) -> Option<StoreRef> {
        let prefix = strip_scope_qualifier(store_id);
        let parent = params.parent_scope_id.as_deref();
        let (start, fallback) = match params.scope_id.as_deref() {
            Some(scope_id) if !scope_id.is_empty() => (scope_id, parent),
            _ => (parent.unwrap_or_default(), None),
        };

        let registry = self.registry();
        match registry.scopes.lookup(start, fallback, prefix) {
            Lookup::Found(found) => registry.stores.get(&found).map(|e| e.store.clone()),
            Lookup::Ambiguous { scope_id, matches } => {
                let error = StoreError::AmbiguousStore {
                    scope_id,
                    prefix: prefix.to_string(),
                };
                tracing::error!(%error, candidates = ?matches, "store lookup is ambiguous");
                None
            }
            Lookup::NotFound => {
                tracing::debug!(%store_id, scope_id = start, "store not found");
                None
            }
        }
    }

    /// Create (or reuse) the stores of one scope.
    ///
    /// Entries are keyed by name; the name doubles as disambiguation key, so
    /// identities read `<type>--<scope>--<name>` unless pinned with
    /// [`StoreDef::with_id`]. Calling this again for the same scope returns the
    /// existing instances.
    pub fn create_stores(&self, defs: &[(&str, StoreDef)], scope: &ScopeParams) -> StoreMap {
        let mut stores = StoreMap::default();

        for (name, def) in defs {
            let store_id = match &def.id {
                Some(id) => id.clone(),
                None => {
                    let params = StoreParams::in_scope(scope.scope_id.clone()).key(*name);
                    resolve_store_id(&def.class, &params)
                }
            };
            let store = self.create_store(&def.class, Placement::scoped(store_id, scope));
            stores.insert(name.to_string(), store);
        }

        stores
    }

    fn existing(&self, store_id: &str) -> Option<StoreRef> {
        self.registry().stores.get(store_id).map(|e| e.store.clone())
    }

    fn create_store(&self, class: &StoreClass, placement: Placement) -> StoreRef {
        if let Some(store) = self.existing(&placement.id) {
            return store;
        }

        let placement = if class.global {
            Placement::global(placement.id)
        } else {
            placement
        };
        let Placement {
            id,
            scope_id,
            parent_scope_id,
            suspense_id,
            component_name,
            component_props,
        } = placement;

        // The constructor runs unlocked so it can reach sibling stores.
        let ctx = StoreContext::new(
            self.downgrade(),
            scope_id.clone(),
            parent_scope_id.clone(),
            component_props,
            self.stores_params().clone(),
        );
        let (instance, any) = class.construct(ctx);
        let store = StoreRef::new(&id, instance, any);

        let (init_state, persisted_state) = {
            let registry = self.registry();
            if let Some(entry) = registry.stores.get(&id) {
                return entry.store.clone();
            }
            (registry.init_state.get(&id).cloned(), registry.persist_data.get(&id).cloned())
        };

        let mut needs_save = false;
        if class.persisted {
            needs_save = store.wakeup(WakeupState {
                init_state,
                persisted_state,
            });
        } else if let Some(init_state) = init_state {
            persist::restore_init_state(&*store, &init_state);
        }

        let change_listener = if class.persisted {
            store.add_on_change_listener(self)
        } else {
            None
        };
        store.init();

        let status = if class.global {
            StoreStatus::InUse
        } else {
            StoreStatus::Init
        };

        {
            let mut guard = self.registry();
            let registry = &mut *guard;
            if let Some(entry) = registry.stores.get(&id) {
                return entry.store.clone();
            }

            let label = (!component_name.is_empty()).then_some(component_name.as_str());
            registry.scopes.register(&id, &scope_id, &parent_scope_id, label);
            if !suspense_id.is_empty() {
                registry.suspense.entry(suspense_id.clone()).or_default().insert(id.clone());
            }

            let mut entry = StoreEntry {
                store: store.clone(),
                meta: StoreMeta {
                    id: id.clone(),
                    scope_id: scope_id.clone(),
                    parent_scope_id,
                    suspense_id,
                    component_name,
                    status,
                    global: class.global,
                    persisted: class.persisted,
                },
                mounts: 0,
                generation: 0,
                timer: None,
                change_listener,
            };
            self.transition(&mut entry, status);
            registry.stores.insert(id.clone(), entry);
        }

        tracing::debug!(store_id = %id, %scope_id, "store created");
        if needs_save {
            self.spawn_save();
        }
        self.publish(StoreEventKind::Created, store.clone());

        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{DestroyTimers, ManagerOptions, ManagerParams};
    use crate::store::{Observable, State};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
    }

    struct UserStore {
        state: State<Profile>,
    }

    impl Store for UserStore {
        fn observable(&self) -> Option<&dyn Observable> {
            Some(&self.state)
        }
    }

    struct Settings;

    impl Store for Settings {}

    struct Details {
        user: Option<Arc<UserStore>>,
    }

    impl Store for Details {}

    fn user_type() -> StoreType<UserStore> {
        StoreType::new(|_| UserStore {
            state: State::default(),
        })
    }

    fn manager() -> Manager {
        Manager::new(ManagerParams {
            options: ManagerOptions {
                destroy_timers: DestroyTimers::disabled(),
                ..ManagerOptions::default()
            },
            ..ManagerParams::default()
        })
    }

    #[test]
    fn create_stores_is_idempotent() {
        let manager = manager();
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        let settings = StoreType::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Settings
        });
        let scope = ScopeParams::root_child("a");

        let first = manager.create_stores(&[("settings", StoreDef::of(&settings))], &scope);
        let second = manager.create_stores(&[("settings", StoreDef::of(&settings))], &scope);

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(first
            .get_ref("settings")
            .unwrap()
            .ptr_eq(second.get_ref("settings").unwrap()));
    }

    #[test]
    fn explicit_def_id_is_used() {
        let manager = manager();
        let stores = manager.create_stores(
            &[("user", StoreDef::of(&user_type()).with_id("current-user"))],
            &ScopeParams::root_child("a"),
        );
        assert_eq!(stores.ids(), vec!["current-user"]);
        assert!(manager.contains("current-user"));
    }

    #[test]
    fn constructor_sees_sibling_created_earlier() {
        let manager = manager();
        let user = user_type();
        let lookup = user.clone();
        let details = StoreType::new(move |ctx: StoreContext| Details {
            user: ctx.get_store(&lookup),
        });

        let stores = manager.create_stores(
            &[("user", StoreDef::of(&user)), ("details", StoreDef::of(&details))],
            &ScopeParams::root_child("a"),
        );

        let details = stores.get::<Details>("details").unwrap();
        let user = stores.get::<UserStore>("user").unwrap();
        assert!(Arc::ptr_eq(details.user.as_ref().unwrap(), &user));
    }

    #[test]
    fn get_store_never_creates_scoped_stores() {
        let manager = manager();
        assert!(manager
            .get_store(&user_type(), StoreParams::in_scope("a"))
            .is_none());
        assert!(manager.store_ids().is_empty());
    }

    #[test]
    fn init_state_applied_to_plain_store() {
        let manager = Manager::new(ManagerParams {
            init_state: Map::from_iter([(
                "UserStore--a--user".to_string(),
                json!({ "name": "ssr" }),
            )]),
            ..ManagerParams::default()
        });

        let stores = manager.create_stores(
            &[("user", StoreDef::of(&user_type()))],
            &ScopeParams::root_child("a"),
        );
        let user = stores.get::<UserStore>("user").unwrap();
        assert_eq!(user.state.get().name, "ssr");
    }

    #[test]
    fn lookup_from_scope_without_stores_uses_parent() {
        let manager = manager();
        let user = user_type();
        manager.create_stores(&[("user", StoreDef::of(&user))], &ScopeParams::root_child("a"));

        let found = manager.get_store(&user, StoreParams::in_scope("child").parent("a"));
        assert!(found.is_some());
    }

    #[test]
    fn meta_records_placement() {
        let manager = manager();
        manager.create_stores(
            &[("user", StoreDef::of(&user_type()))],
            &ScopeParams::new("b", "b").suspense("sus").component("Profile"),
        );

        let meta = manager.meta("UserStore--b--user").unwrap();
        assert_eq!(meta.parent_scope_id, ROOT_SCOPE);
        assert_eq!(meta.suspense_id, "sus");
        assert_eq!(meta.component_name, "Profile");
        assert_eq!(meta.status, StoreStatus::Init);
        assert_eq!(manager.suspense_store_ids("sus"), vec!["UserStore--b--user"]);
        assert_eq!(manager.scope("b").unwrap().label.as_deref(), Some("Profile"));
    }
}

use super::params::StoreParams;
use super::state::{Observable, Subscription};
use crate::manager::{Manager, WeakManager};
use crate::persist;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Deferred cleanup action returned by mount hooks and `mount_stores`.
pub type Teardown = Box<dyn FnOnce() + Send>;

/// State restored into a store right after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WakeupState {
    /// Bootstrap or streamed state, consumed once.
    pub init_state: Option<Value>,
    /// State read from the storage backend.
    pub persisted_state: Option<Value>,
}

/// A stateful object managed by the registry.
///
/// Every hook has a default, so a store only overrides what it needs.
/// Persisted stores get [`Store::wakeup`] and [`Store::add_on_change_listener`]
/// invoked by the manager; the defaults work off [`Store::observable`].
pub trait Store: Send + Sync + 'static {
    /// Observable surface used for snapshots, restore and change tracking.
    fn observable(&self) -> Option<&dyn Observable> {
        None
    }

    /// Custom serialization. Overrides the observable snapshot when `Some`.
    fn to_json(&self) -> Option<Value> {
        None
    }

    /// Called once after construction and restore, before registration.
    fn init(&self) {}

    /// Called every time the store is mounted. The returned teardown runs when
    /// that mount is released.
    fn on_mount(&self) -> Option<Teardown> {
        None
    }

    /// Called when the store is evicted.
    fn on_destroy(&self) {}

    /// Restore persisted and bootstrap state. Returns `true` when the storage
    /// backend is behind the restored state and should be saved.
    fn wakeup(&self, state: WakeupState) -> bool {
        persist::wakeup(self, state)
    }

    /// Start re-persisting on change. Dropping the subscription detaches it.
    fn add_on_change_listener(&self, manager: &Manager) -> Option<Subscription> {
        persist::on_change_listener(self, manager)
    }
}

/// Serialize a store: custom `to_json`, else its observable snapshot.
pub(crate) fn snapshot_of(store: &dyn Store) -> Value {
    store
        .to_json()
        .or_else(|| store.observable().map(Observable::snapshot))
        .unwrap_or_else(|| Value::Object(Map::new()))
}

type Factory = dyn Fn(StoreContext) -> (Arc<dyn Store>, Arc<dyn Any + Send + Sync>) + Send + Sync;

/// Untyped registration data of a store type.
#[derive(Clone)]
pub(crate) struct StoreClass {
    pub(crate) name: String,
    pub(crate) static_id: Option<String>,
    pub(crate) global: bool,
    pub(crate) persisted: bool,
    factory: Arc<Factory>,
}

impl StoreClass {
    pub(crate) fn construct(
        &self,
        ctx: StoreContext,
    ) -> (Arc<dyn Store>, Arc<dyn Any + Send + Sync>) {
        (self.factory)(ctx)
    }
}

/// Registration descriptor for a store type.
///
/// Holds the type's name, optional static identity, global flag and
/// persistence flag, plus the constructor the manager calls.
///
/// # Examples
///
/// ```
/// use storehouse::{State, Store, StoreContext, StoreType, Observable};
///
/// struct Counter {
///     count: State<u32>,
/// }
///
/// impl Store for Counter {
///     fn observable(&self) -> Option<&dyn Observable> {
///         Some(&self.count)
///     }
/// }
///
/// let counter = StoreType::new(|_: StoreContext| Counter { count: State::new(0) });
/// assert_eq!(counter.name(), "Counter");
/// ```
pub struct StoreType<S> {
    class: Arc<StoreClass>,
    _marker: PhantomData<fn() -> S>,
}

impl<S: Store> StoreType<S> {
    /// Register a store type with its constructor.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(StoreContext) -> S + Send + Sync + 'static,
    {
        let full = std::any::type_name::<S>();
        // Generic arguments carry their own paths.
        let base = full.split('<').next().unwrap_or(full);
        let name = base.rsplit("::").next().unwrap_or("Store").to_string();

        Self::from_class(StoreClass {
            name,
            static_id: None,
            global: false,
            persisted: false,
            factory: Arc::new(move |ctx| {
                let store = Arc::new(factory(ctx));
                let as_store: Arc<dyn Store> = store.clone();
                let as_any: Arc<dyn Any + Send + Sync> = store;
                (as_store, as_any)
            }),
        })
    }

    fn from_class(class: StoreClass) -> Self {
        Self {
            class: Arc::new(class),
            _marker: PhantomData,
        }
    }

    fn map_class(&self, f: impl FnOnce(&mut StoreClass)) -> Self {
        let mut class = (*self.class).clone();
        f(&mut class);
        Self::from_class(class)
    }

    /// Override the type name used in composite identities.
    pub fn named(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.map_class(|class| class.name = name)
    }

    /// Mark the type as global: one instance process-wide, parented at root.
    pub fn global(self) -> Self {
        self.map_class(|class| class.global = true)
    }

    /// Attach a static identity to the type.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.map_class(|class| class.static_id = Some(id))
    }

    pub(crate) fn into_persisted(self, id: &str) -> Self {
        self.map_class(|class| {
            class.static_id = Some(id.to_string());
            class.persisted = true;
        })
    }

    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn static_id(&self) -> Option<&str> {
        self.class.static_id.as_deref()
    }

    pub fn is_global(&self) -> bool {
        self.class.global
    }

    pub fn is_persisted(&self) -> bool {
        self.class.persisted
    }

    pub(crate) fn class(&self) -> &Arc<StoreClass> {
        &self.class
    }
}

impl<S> Clone for StoreType<S> {
    fn clone(&self) -> Self {
        Self {
            class: Arc::clone(&self.class),
            _marker: PhantomData,
        }
    }
}

impl<S> fmt::Debug for StoreType<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreType")
            .field("name", &self.class.name)
            .field("static_id", &self.class.static_id)
            .field("global", &self.class.global)
            .field("persisted", &self.class.persisted)
            .finish()
    }
}

/// One entry of a `create_stores` batch.
#[derive(Clone)]
pub struct StoreDef {
    pub(crate) class: Arc<StoreClass>,
    pub(crate) id: Option<String>,
}

impl StoreDef {
    pub fn of<S: Store>(store_type: &StoreType<S>) -> Self {
        Self {
            class: Arc::clone(store_type.class()),
            id: None,
        }
    }

    /// Pin the identity of this entry instead of deriving it from the scope.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl<S: Store> From<&StoreType<S>> for StoreDef {
    fn from(store_type: &StoreType<S>) -> Self {
        Self::of(store_type)
    }
}

/// Shared reference to a live store together with its identity.
#[derive(Clone)]
pub struct StoreRef {
    id: Arc<str>,
    store: Arc<dyn Store>,
    any: Arc<dyn Any + Send + Sync>,
}

impl StoreRef {
    pub(crate) fn new(id: &str, store: Arc<dyn Store>, any: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id: Arc::from(id),
            store,
            any,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Typed access to the store.
    pub fn downcast<S: Store>(&self) -> Option<Arc<S>> {
        Arc::clone(&self.any).downcast::<S>().ok()
    }

    /// Whether both references point at the same instance.
    pub fn ptr_eq(&self, other: &StoreRef) -> bool {
        Arc::ptr_eq(&self.any, &other.any)
    }

    pub(crate) fn snapshot(&self) -> Value {
        snapshot_of(self.store.as_ref())
    }
}

impl Deref for StoreRef {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

impl fmt::Debug for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StoreRef").field(&self.id).finish()
    }
}

/// Stores created for one scope, keyed by the name they were requested under.
#[derive(Debug, Clone, Default)]
pub struct StoreMap {
    stores: IndexMap<String, StoreRef>,
}

impl StoreMap {
    pub(crate) fn insert(&mut self, name: String, store: StoreRef) {
        self.stores.insert(name, store);
    }

    /// Typed access by name.
    pub fn get<S: Store>(&self, name: &str) -> Option<Arc<S>> {
        self.stores.get(name).and_then(StoreRef::downcast)
    }

    pub fn get_ref(&self, name: &str) -> Option<&StoreRef> {
        self.stores.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoreRef)> {
        self.stores.iter().map(|(name, store)| (name.as_str(), store))
    }

    pub fn ids(&self) -> Vec<String> {
        self.stores.values().map(|s| s.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// Constructor context handed to a store factory.
///
/// Lets a store reach other stores relative to the scope it is created in.
#[derive(Clone)]
pub struct StoreContext {
    manager: WeakManager,
    scope_id: String,
    parent_scope_id: String,
    component_props: Value,
    params: Value,
}

impl StoreContext {
    pub(crate) fn new(
        manager: WeakManager,
        scope_id: String,
        parent_scope_id: String,
        component_props: Value,
        params: Value,
    ) -> Self {
        Self {
            manager,
            scope_id,
            parent_scope_id,
            component_props,
            params,
        }
    }

    /// Look up another store from this store's scope.
    pub fn get_store<T: Store>(&self, store_type: &StoreType<T>) -> Option<Arc<T>> {
        let params =
            StoreParams::in_scope(self.scope_id.clone()).parent(self.parent_scope_id.clone());
        self.get_store_with(store_type, params)
    }

    /// Look up another store with explicit params.
    pub fn get_store_with<T: Store>(
        &self,
        store_type: &StoreType<T>,
        params: StoreParams,
    ) -> Option<Arc<T>> {
        self.manager.upgrade()?.get_store(store_type, params)
    }

    /// The manager, if it is still alive.
    pub fn manager(&self) -> Option<Manager> {
        self.manager.upgrade()
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn parent_scope_id(&self) -> &str {
        &self.parent_scope_id
    }

    /// Props of the component that requested the store.
    pub fn component_props(&self) -> &Value {
        &self.component_props
    }

    /// Extra constructor params configured on the manager.
    pub fn params(&self) -> &Value {
        &self.params
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("scope_id", &self.scope_id)
            .field("parent_scope_id", &self.parent_scope_id)
            .finish_non_exhaustive()
    }
}

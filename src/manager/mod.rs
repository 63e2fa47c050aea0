//! The store registry.
//!
//! [`Manager`] owns every live store, the scope tree they are registered in,
//! the bootstrap (init) state and the restored persisted state. It is a cheap
//! cloneable handle; pass it to whatever needs to create, look up or
//! serialize stores.

mod identity;
mod lifecycle;
mod options;
mod registry;

pub use identity::ID_SEPARATOR;
pub use options::{DestroyTimers, ManagerOptions};

use crate::error::{Result, StoreError};
use crate::events::{StoreEvent, StoreEventKind, EVENT_CAPACITY};
use crate::persist::Storage;
use crate::scope::{create_scope_id, Scope, ScopeTree};
use crate::store::{StoreRef, StoreStatus, StoreType, Store, Subscription};
use indexmap::IndexSet;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{broadcast, Notify};
use tokio::task::AbortHandle;

/// Registry-assigned metadata of a live store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMeta {
    pub id: String,
    pub scope_id: String,
    pub parent_scope_id: String,
    pub suspense_id: String,
    pub component_name: String,
    pub status: StoreStatus,
    pub global: bool,
    pub persisted: bool,
}

/// Constructor parameters of a [`Manager`].
#[derive(Default)]
pub struct ManagerParams {
    /// Bootstrap state keyed by store id.
    pub init_state: Map<String, Value>,
    /// Extra params handed to every store constructor.
    pub stores_params: Value,
    /// Durable backend for persisted stores.
    pub storage: Option<Arc<dyn Storage>>,
    pub options: ManagerOptions,
}

pub(crate) struct StoreEntry {
    pub(crate) store: StoreRef,
    pub(crate) meta: StoreMeta,
    pub(crate) mounts: usize,
    /// Bumped on every status change; stale eviction timers compare against it.
    pub(crate) generation: u64,
    pub(crate) timer: Option<AbortHandle>,
    pub(crate) change_listener: Option<Subscription>,
}

#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) stores: HashMap<String, StoreEntry>,
    pub(crate) scopes: ScopeTree,
    pub(crate) suspense: HashMap<String, IndexSet<String>>,
    pub(crate) init_state: Map<String, Value>,
    pub(crate) persist_data: Map<String, Value>,
}

struct Inner {
    registry: Mutex<Registry>,
    storage: Option<Arc<dyn Storage>>,
    options: ManagerOptions,
    stores_params: Value,
    events: broadcast::Sender<StoreEvent>,
    scope_seq: AtomicU64,
    /// Wakes the saver task; pending wakeups coalesce into one permit.
    save_signal: Arc<Notify>,
    saver_started: AtomicBool,
    pub(crate) runtime_warned: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Let a parked saver observe that the manager is gone.
        self.save_signal.notify_one();
    }
}

/// Handle to a store registry.
///
/// # Examples
///
/// ```
/// use storehouse::{Manager, ManagerParams, ScopeParams, Store, StoreDef, StoreParams, StoreType};
///
/// struct Session;
/// impl Store for Session {}
///
/// let session = StoreType::new(|_| Session);
/// let manager = Manager::new(ManagerParams::default());
///
/// let stores = manager.create_stores(
///     &[("session", StoreDef::of(&session))],
///     &ScopeParams::root_child("s1"),
/// );
/// assert_eq!(stores.ids(), vec!["Session--s1--session"]);
///
/// let found = manager.get_store(&session, StoreParams::in_scope("s1"));
/// assert!(found.is_some());
/// ```
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`Manager`], held by stores and timers.
#[derive(Clone)]
pub struct WeakManager {
    inner: Weak<Inner>,
}

impl WeakManager {
    pub fn upgrade(&self) -> Option<Manager> {
        self.inner.upgrade().map(|inner| Manager { inner })
    }
}

fn global_slot() -> &'static RwLock<Option<Manager>> {
    static INSTANCE: OnceLock<RwLock<Option<Manager>>> = OnceLock::new();
    INSTANCE.get_or_init(|| RwLock::new(None))
}

fn persisted_ids() -> &'static Mutex<IndexSet<String>> {
    static PERSISTED: OnceLock<Mutex<IndexSet<String>>> = OnceLock::new();
    PERSISTED.get_or_init(|| Mutex::new(IndexSet::new()))
}

impl Manager {
    /// Create a manager.
    ///
    /// Eviction timers and background saves run on the tokio runtime that is
    /// current when they are scheduled. Without one, stores are never evicted
    /// automatically and have to be released with [`Manager::evict_store`].
    pub fn new(params: ManagerParams) -> Self {
        let ManagerParams {
            init_state,
            stores_params,
            storage,
            options,
        } = params;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    init_state,
                    ..Registry::default()
                }),
                storage,
                options,
                stores_params,
                events,
                scope_seq: AtomicU64::new(0),
                save_signal: Arc::new(Notify::new()),
                saver_started: AtomicBool::new(false),
                runtime_warned: AtomicBool::new(false),
            }),
        }
    }

    /// Load persisted data from the storage backend.
    ///
    /// A failing backend is logged and the manager starts without persisted
    /// data.
    pub async fn init(self) -> Self {
        if let Some(storage) = self.inner.storage.clone() {
            match storage.get().await {
                Ok(data) => self.registry().persist_data = data.unwrap_or_default(),
                Err(error) => tracing::error!(%error, "failed to read persisted stores"),
            }
        }
        self
    }

    /// Install this manager as the process-wide instance returned by
    /// [`Manager::get`].
    pub fn make_global(&self) {
        *global_slot().write() = Some(self.clone());
    }

    /// The process-wide instance.
    ///
    /// Fails with [`StoreError::NotInitialized`] until some manager called
    /// [`Manager::make_global`]; callers have to fix their startup order.
    pub fn get() -> Result<Manager> {
        global_slot().read().clone().ok_or(StoreError::NotInitialized)
    }

    /// Like [`Manager::get`], for callers that cannot handle the error.
    ///
    /// # Panics
    ///
    /// Panics when no manager was installed with [`Manager::make_global`].
    pub fn instance() -> Manager {
        Self::get().unwrap_or_else(|error| panic!("{error}"))
    }

    pub fn downgrade(&self) -> WeakManager {
        WeakManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.inner.options
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn stores_params(&self) -> &Value {
        &self.inner.stores_params
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock()
    }

    /// Subscribe to store lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn publish(&self, kind: StoreEventKind, store: StoreRef) {
        // No receivers is the normal case.
        let _ = self.inner.events.send(StoreEvent { kind, store });
    }

    /// Merge state pushed by the server into the init state. Stores created
    /// afterwards pick it up during wakeup.
    pub fn push_init_state(&self, state: Map<String, Value>) {
        let mut registry = self.registry();
        for (store_id, value) in state {
            tracing::trace!(%store_id, "init state received");
            registry.init_state.insert(store_id, value);
        }
    }

    pub fn init_state(&self, store_id: &str) -> Option<Value> {
        self.registry().init_state.get(store_id).cloned()
    }

    /// Last known durable state of a persisted store: what storage returned
    /// on `init`, updated by every save.
    pub fn persisted_data(&self, store_id: &str) -> Option<Value> {
        self.registry().persist_data.get(store_id).cloned()
    }

    /// Ids of all live stores, sorted.
    pub fn store_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry().stores.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, store_id: &str) -> bool {
        self.registry().stores.contains_key(store_id)
    }

    pub fn meta(&self, store_id: &str) -> Option<StoreMeta> {
        self.registry().stores.get(store_id).map(|e| e.meta.clone())
    }

    pub fn status(&self, store_id: &str) -> Option<StoreStatus> {
        self.registry().stores.get(store_id).map(|e| e.meta.status)
    }

    pub fn scope(&self, scope_id: &str) -> Option<Scope> {
        self.registry().scopes.get(scope_id).cloned()
    }

    pub fn scope_ids(&self) -> Vec<String> {
        self.registry().scopes.ids()
    }

    /// Store ids registered in a scope.
    pub fn scope_members(&self, scope_id: &str) -> Vec<String> {
        self.registry().scopes.members(scope_id)
    }

    /// Store ids created under a suspense boundary.
    pub fn suspense_store_ids(&self, suspense_id: &str) -> Vec<String> {
        self.registry()
            .suspense
            .get(suspense_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A fresh scope id, distinct from every id this manager handed out.
    pub fn next_scope_id(&self) -> String {
        format!("s{}", self.inner.scope_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Normalise a seed into a scope id. See [`create_scope_id`].
    pub fn create_scope_id(seed: &str) -> String {
        create_scope_id(seed)
    }

    /// Flag a store type as persisted under `id`.
    ///
    /// Registering an id twice logs a warning and returns `store_type`
    /// unchanged; the first registration stays in effect.
    pub fn persist_store<S: Store>(store_type: StoreType<S>, id: &str) -> StoreType<S> {
        if !persisted_ids().lock().insert(id.to_string()) {
            let error = StoreError::DuplicatePersistId(id.to_string());
            tracing::warn!(%error, "persist_store ignored");
            return store_type;
        }
        store_type.into_persisted(id)
    }

    /// Ids registered through [`Manager::persist_store`] in this process.
    pub fn persisted_store_ids() -> Vec<String> {
        persisted_ids().lock().iter().cloned().collect()
    }

    /// Serialize the given stores, or all stores when `ids` is `None`.
    /// Unknown ids are skipped.
    pub fn to_json(&self, ids: Option<&[String]>) -> Map<String, Value> {
        let stores: Vec<StoreRef> = {
            let registry = self.registry();
            match ids {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| registry.stores.get(id))
                    .map(|e| e.store.clone())
                    .collect(),
                None => registry.stores.values().map(|e| e.store.clone()).collect(),
            }
        };

        stores
            .into_iter()
            .map(|store| (store.id().to_string(), store.snapshot()))
            .collect()
    }

    /// Serialize the live persisted stores.
    pub fn to_persisted_json(&self) -> Map<String, Value> {
        let persisted: HashSet<String> = persisted_ids().lock().iter().cloned().collect();
        let ids: Vec<String> = {
            let registry = self.registry();
            registry
                .stores
                .keys()
                .filter(|id| persisted.contains(*id))
                .cloned()
                .collect()
        };
        self.to_json(Some(&ids))
    }

    /// Write all persisted stores to the storage backend.
    ///
    /// Live stores are snapshotted at call time and merged over the data
    /// already known, so evicted persisted stores keep their last state.
    pub async fn save_persisted(&self) -> Result<()> {
        if self.inner.options.should_disable_persist {
            return Ok(());
        }
        let Some(storage) = self.inner.storage.clone() else {
            return Ok(());
        };

        let live = self.to_persisted_json();
        let data = {
            let mut registry = self.registry();
            registry.persist_data.extend(live);
            registry.persist_data.clone()
        };
        storage.set(data).await
    }

    /// Request a background save. Failures are logged.
    ///
    /// Saves run one at a time on a single saver task per manager, and
    /// requests made while a write is in flight collapse into one more write,
    /// which snapshots the state current when it starts.
    pub(crate) fn spawn_save(&self) {
        if !self.inner.saver_started.load(Ordering::SeqCst) {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::debug!("no async runtime, persisted stores not saved");
                return;
            };
            if !self.inner.saver_started.swap(true, Ordering::SeqCst) {
                handle.spawn(run_saver(self.downgrade(), Arc::clone(&self.inner.save_signal)));
            }
        }
        self.inner.save_signal.notify_one();
    }
}

async fn run_saver(manager: WeakManager, signal: Arc<Notify>) {
    loop {
        signal.notified().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };
        if let Err(error) = manager.save_persisted().await {
            tracing::error!(%error, "failed to persist stores");
        }
    }
    tracing::trace!("saver stopped");
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("Manager")
            .field("stores", &registry.stores.len())
            .field("scopes", &registry.scopes.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

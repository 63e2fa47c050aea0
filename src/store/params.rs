use crate::scope::ROOT_SCOPE;
use serde_json::Value;

/// Parameters for resolving a single store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreParams {
    /// Explicit identity; wins over everything else.
    pub id: Option<String>,
    /// Disambiguates several stores of one type in a scope.
    pub key: Option<String>,
    /// Scope the request originates from.
    pub scope_id: Option<String>,
    /// Parent of `scope_id`, used when the scope has no stores of its own.
    pub parent_scope_id: Option<String>,
}

impl StoreParams {
    /// Params for a request made from `scope_id`.
    pub fn in_scope(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: Some(scope_id.into()),
            ..Self::default()
        }
    }

    /// Params that select a store by its exact identity.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn parent(mut self, parent_scope_id: impl Into<String>) -> Self {
        self.parent_scope_id = Some(parent_scope_id.into());
        self
    }
}

/// Describes the scope a batch of stores is created in.
///
/// One value corresponds to one mounted subtree instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeParams {
    pub scope_id: String,
    pub parent_scope_id: String,
    /// Suspense boundary the subtree rendered under, empty if none.
    pub suspense_id: String,
    /// Name of the component that owns the scope.
    pub component_name: String,
    /// Props handed to store constructors.
    pub component_props: Value,
}

impl ScopeParams {
    pub fn new(scope_id: impl Into<String>, parent_scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            parent_scope_id: parent_scope_id.into(),
            suspense_id: String::new(),
            component_name: String::new(),
            component_props: Value::Null,
        }
    }

    /// A scope directly below the root.
    pub fn root_child(scope_id: impl Into<String>) -> Self {
        Self::new(scope_id, ROOT_SCOPE)
    }

    pub fn suspense(mut self, suspense_id: impl Into<String>) -> Self {
        self.suspense_id = suspense_id.into();
        self
    }

    pub fn component(mut self, component_name: impl Into<String>) -> Self {
        self.component_name = component_name.into();
        self
    }

    pub fn props(mut self, component_props: Value) -> Self {
        self.component_props = component_props;
        self
    }
}

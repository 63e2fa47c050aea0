use super::{GLOBAL_SCOPE, ROOT_SCOPE};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

/// One mounted subtree instance and the stores registered in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub id: String,
    pub parent_id: String,
    pub member_ids: IndexSet<String>,
    /// Name of the component that created the scope.
    pub label: Option<String>,
}

/// Outcome of a prefix lookup through the scope chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    /// Several members of `scope_id` share the prefix.
    Ambiguous { scope_id: String, matches: Vec<String> },
    NotFound,
}

/// Forest of scopes keyed by scope id.
///
/// Scopes are created on first registration and pruned when their last member
/// leaves. Every parent chain ends at [`ROOT_SCOPE`].
#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: HashMap<String, Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `store_id` to `scope_id`, creating the scope if needed.
    ///
    /// The parent is only recorded when the scope is created. A parent equal
    /// to the scope itself, an empty parent, or one that would close a cycle
    /// falls back to the root.
    pub fn register(
        &mut self,
        store_id: &str,
        scope_id: &str,
        parent_id: &str,
        label: Option<&str>,
    ) {
        if !self.scopes.contains_key(scope_id) {
            let parent_id = self.sanitize_parent(scope_id, parent_id);
            self.scopes.insert(
                scope_id.to_string(),
                Scope {
                    id: scope_id.to_string(),
                    parent_id,
                    member_ids: IndexSet::new(),
                    label: label.filter(|l| !l.is_empty()).map(str::to_string),
                },
            );
        }

        if let Some(scope) = self.scopes.get_mut(scope_id) {
            scope.member_ids.insert(store_id.to_string());
        }
    }

    /// Remove `store_id` from `scope_id`. Returns `true` when the scope became
    /// empty and was pruned.
    pub fn unregister(&mut self, store_id: &str, scope_id: &str) -> bool {
        let Some(scope) = self.scopes.get_mut(scope_id) else {
            return false;
        };

        scope.member_ids.shift_remove(store_id);
        if scope.member_ids.is_empty() {
            self.scopes.remove(scope_id);
            return true;
        }
        false
    }

    pub fn get(&self, scope_id: &str) -> Option<&Scope> {
        self.scopes.get(scope_id)
    }

    pub fn contains(&self, scope_id: &str) -> bool {
        self.scopes.contains_key(scope_id)
    }

    pub fn parent_of(&self, scope_id: &str) -> Option<&str> {
        self.scopes.get(scope_id).map(|s| s.parent_id.as_str())
    }

    /// Member store ids of a scope, in registration order.
    pub fn members(&self, scope_id: &str) -> Vec<String> {
        self.scopes
            .get(scope_id)
            .map(|s| s.member_ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.scopes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Recorded ancestors of `scope_id`, nearest first, excluding the root.
    pub fn ancestors(&self, scope_id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([scope_id.to_string()]);
        let mut current = self.parent_of(scope_id);

        while let Some(parent) = current {
            if parent == ROOT_SCOPE || !seen.insert(parent.to_string()) {
                break;
            }
            chain.push(parent.to_string());
            current = self.parent_of(parent);
        }
        chain
    }

    /// Find the single store whose id starts with `<prefix>--`, walking from
    /// `scope_id` towards the root.
    ///
    /// `fallback_parent` is used as the next hop when `scope_id` itself has no
    /// record (a component without stores of its own).
    pub fn lookup(&self, scope_id: &str, fallback_parent: Option<&str>, prefix: &str) -> Lookup {
        let needle = format!("{prefix}{}", crate::manager::ID_SEPARATOR);
        let mut fallback = fallback_parent;
        let mut visited = HashSet::new();
        let mut current = scope_id.to_string();

        loop {
            if current.is_empty() || current == ROOT_SCOPE || !visited.insert(current.clone()) {
                return Lookup::NotFound;
            }

            let next = match self.scopes.get(&current) {
                Some(scope) => {
                    let mut matches: Vec<String> = scope
                        .member_ids
                        .iter()
                        .filter(|id| id.starts_with(&needle))
                        .cloned()
                        .collect();

                    match matches.len() {
                        0 => {}
                        1 => return Lookup::Found(matches.swap_remove(0)),
                        _ => {
                            return Lookup::Ambiguous {
                                scope_id: current,
                                matches,
                            }
                        }
                    }
                    Some(scope.parent_id.clone())
                }
                None => fallback.map(str::to_string),
            };

            fallback = None;
            match next {
                Some(parent) => current = parent,
                None => return Lookup::NotFound,
            }
        }
    }

    fn sanitize_parent(&self, scope_id: &str, parent_id: &str) -> String {
        if scope_id == GLOBAL_SCOPE || parent_id.is_empty() || parent_id == scope_id {
            return ROOT_SCOPE.to_string();
        }

        let closes_cycle = self.ancestors(parent_id).iter().any(|a| a == scope_id);
        if closes_cycle {
            tracing::warn!(scope_id, parent_id, "scope parent would create a cycle, using root");
            return ROOT_SCOPE.to_string();
        }
        parent_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_and_prunes_scope() {
        let mut tree = ScopeTree::new();
        tree.register("User--a", "a", ROOT_SCOPE, Some("Page"));
        tree.register("Cart--a", "a", ROOT_SCOPE, None);

        assert_eq!(tree.members("a"), vec!["User--a", "Cart--a"]);
        assert_eq!(tree.get("a").unwrap().label.as_deref(), Some("Page"));

        assert!(!tree.unregister("User--a", "a"));
        assert!(tree.unregister("Cart--a", "a"));
        assert!(!tree.contains("a"));
    }

    #[test]
    fn self_parent_falls_back_to_root() {
        let mut tree = ScopeTree::new();
        tree.register("User--a", "a", "a", None);
        assert_eq!(tree.parent_of("a"), Some(ROOT_SCOPE));
    }

    #[test]
    fn cycle_is_broken_at_root() {
        let mut tree = ScopeTree::new();
        tree.register("Child--b", "b", "a", None);
        tree.register("Parent--a", "a", "b", None);

        assert_eq!(tree.parent_of("a"), Some(ROOT_SCOPE));
        assert_eq!(tree.ancestors("b"), vec!["a"]);
    }

    #[test]
    fn lookup_walks_to_parent() {
        let mut tree = ScopeTree::new();
        tree.register("User--a--user", "a", ROOT_SCOPE, None);
        tree.register("Details--b--details", "b", "a", None);

        assert_eq!(tree.lookup("b", None, "User"), Lookup::Found("User--a--user".into()));
        assert_eq!(tree.lookup("b", None, "Missing"), Lookup::NotFound);
    }

    #[test]
    fn lookup_uses_fallback_for_unknown_scope() {
        let mut tree = ScopeTree::new();
        tree.register("User--a--user", "a", ROOT_SCOPE, None);

        assert_eq!(tree.lookup("x", Some("a"), "User"), Lookup::Found("User--a--user".into()));
        assert_eq!(tree.lookup("x", None, "User"), Lookup::NotFound);
    }

    #[test]
    fn lookup_reports_ambiguity() {
        let mut tree = ScopeTree::new();
        tree.register("User--a--first", "a", ROOT_SCOPE, None);
        tree.register("User--a--second", "a", ROOT_SCOPE, None);

        match tree.lookup("a", None, "User") {
            Lookup::Ambiguous { scope_id, matches } => {
                assert_eq!(scope_id, "a");
                assert_eq!(matches.len(), 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn prefix_requires_separator() {
        let mut tree = ScopeTree::new();
        tree.register("UserList--a--list", "a", ROOT_SCOPE, None);
        assert_eq!(tree.lookup("a", None, "User"), Lookup::NotFound);
    }
}

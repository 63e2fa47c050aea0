use crate::store::{StoreClass, StoreParams};

/// Separator between the parts of a composite store identity.
pub const ID_SEPARATOR: &str = "--";

/// Resolve the identity of a store request.
///
/// Order: explicit `id`, the type's static id, the bare name for global
/// stores, then `<name>--<scope>[--<key>]`.
pub(crate) fn resolve_store_id(class: &StoreClass, params: &StoreParams) -> String {
    if let Some(id) = params.id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    if let Some(id) = class.static_id.as_deref() {
        return id.to_string();
    }

    if class.global {
        return class.name.clone();
    }

    let scope_id = params.scope_id.as_deref().unwrap_or_default();
    let id = format!("{}{ID_SEPARATOR}{scope_id}", class.name);

    match params.key.as_deref().filter(|key| !key.is_empty()) {
        Some(key) => format!("{id}{ID_SEPARATOR}{key}"),
        None => id,
    }
}

/// Bare store name of an identity, without scope qualification.
pub(crate) fn strip_scope_qualifier(id: &str) -> &str {
    id.split(ID_SEPARATOR).next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreType};

    struct UserStore;

    impl Store for UserStore {}

    fn class() -> StoreType<UserStore> {
        StoreType::new(|_| UserStore)
    }

    #[test]
    fn explicit_id_wins() {
        let ty = class().with_id("static");
        let params = StoreParams::with_id("explicit");
        assert_eq!(resolve_store_id(ty.class(), &params), "explicit");
    }

    #[test]
    fn static_id_wins_over_scope() {
        let ty = class().with_id("static");
        let params = StoreParams::in_scope("s1").key("k");
        assert_eq!(resolve_store_id(ty.class(), &params), "static");
    }

    #[test]
    fn global_ignores_scope() {
        let ty = class().global();
        let params = StoreParams::in_scope("s1").key("k");
        assert_eq!(resolve_store_id(ty.class(), &params), "UserStore");
    }

    #[test]
    fn composite_identity() {
        let ty = class();
        assert_eq!(
            resolve_store_id(ty.class(), &StoreParams::in_scope("s1")),
            "UserStore--s1"
        );
        assert_eq!(
            resolve_store_id(ty.class(), &StoreParams::in_scope("s1").key("main")),
            "UserStore--s1--main"
        );
    }

    #[test]
    fn strip_qualifier() {
        assert_eq!(strip_scope_qualifier("UserStore--s1--main"), "UserStore");
        assert_eq!(strip_scope_qualifier("plain"), "plain");
    }
}

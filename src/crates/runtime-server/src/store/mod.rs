//! Store backends and namespace normalization.
//!
//! The wire format accepts namespaces both as a slash-joined string
//! (query parameters) and as a JSON list (request bodies). The canonical
//! form is the list; [`normalize_namespace`] is the single code path that
//! produces it, so both ingress forms reach the same storage row.

pub mod sqlite;

pub use agent_graph::store::{AgentStore, InMemoryStore, Namespace, StoreItem};
pub use sqlite::SqliteStore;

/// Owner id used for runtime-internal items (OAuth token cache). Kept out
/// of every user's namespace so internal writes can never collide with
/// user data.
pub const INTERNAL_OWNER: &str = "system_internal";

/// Normalize a wire-format namespace into the canonical list form.
///
/// Accepted forms:
/// - JSON string: `"a/b/c"`, split on `/`; `""` canonicalizes to the empty
///   list (a prefix of everything)
/// - JSON array of strings: `["a", "b", "c"]`
/// - `null`/absent: empty list
pub fn normalize_namespace(raw: Option<&serde_json::Value>) -> Result<Namespace, String> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::String(s)) => Ok(split_namespace(s)),
        Some(serde_json::Value::Array(parts)) => parts
            .iter()
            .map(|part| {
                part.as_str()
                    .map(String::from)
                    .ok_or_else(|| "namespace list elements must be strings".to_string())
            })
            .filter(|part| !matches!(part, Ok(p) if p.is_empty()))
            .collect(),
        Some(other) => Err(format!(
            "namespace must be a string or a list of strings, got {}",
            other
        )),
    }
}

/// Split a slash-joined namespace string, dropping empty components.
pub fn split_namespace(raw: &str) -> Namespace {
    raw.split('/')
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// Canonical storage form: components joined with `/`.
pub fn join_namespace(namespace: &[String]) -> String {
    namespace.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_and_list_forms_normalize_identically() {
        let from_string = normalize_namespace(Some(&json!("a/b/c"))).unwrap();
        let from_list = normalize_namespace(Some(&json!(["a", "b", "c"]))).unwrap();
        assert_eq!(from_string, from_list);
        assert_eq!(from_string, vec!["a", "b", "c"]);
    }

    #[test]
    fn single_component_forms_match() {
        assert_eq!(
            normalize_namespace(Some(&json!("preferences"))).unwrap(),
            normalize_namespace(Some(&json!(["preferences"]))).unwrap()
        );
    }

    #[test]
    fn empty_string_is_the_empty_namespace() {
        assert!(normalize_namespace(Some(&json!(""))).unwrap().is_empty());
        assert!(normalize_namespace(None).unwrap().is_empty());
        assert!(normalize_namespace(Some(&json!(null))).unwrap().is_empty());
    }

    #[test]
    fn stray_slashes_are_dropped() {
        assert_eq!(split_namespace("/a//b/"), vec!["a", "b"]);
    }

    #[test]
    fn non_string_elements_are_rejected() {
        assert!(normalize_namespace(Some(&json!(["a", 1]))).is_err());
        assert!(normalize_namespace(Some(&json!(42))).is_err());
    }

    #[test]
    fn join_round_trips_split() {
        let ns = vec!["a".to_string(), "b".to_string()];
        assert_eq!(split_namespace(&join_namespace(&ns)), ns);
    }
}

//! Process-wide logging context
//!
//! [`GlobalContext`] holds the state every logger attaches to new entries:
//! a structured context map, the current user id and the session id. It is
//! shared behind an `Arc` by the loggers a [`LogHood`](super::LogHood)
//! creates. Mutations are last-writer-wins; each entry receives its own
//! copy, so later changes never alter entries already dispatched.

use super::log_entry::Fields;
use parking_lot::RwLock;
use serde_json::Value;

/// Random 128-bit hex id
pub(crate) fn generate_session_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[derive(Debug)]
struct ContextState {
    values: Fields,
    user_id: Option<String>,
    session_id: String,
}

/// Copy of the context taken for one entry
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    /// `None` when the context map is empty
    pub values: Option<Fields>,
    pub user_id: Option<String>,
    pub session_id: String,
}

#[derive(Debug)]
pub struct GlobalContext {
    state: RwLock<ContextState>,
}

impl GlobalContext {
    /// Create a context with a fresh session id
    pub fn new() -> Self {
        Self::with_session_id(generate_session_id())
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(ContextState {
                values: Fields::new(),
                user_id: None,
                session_id: session_id.into(),
            }),
        }
    }

    /// Replace the whole context map
    pub fn set_context(&self, values: Fields) {
        self.state.write().values = values;
    }

    /// Merge keys into the context map, overwriting existing keys
    pub fn merge_context(&self, values: Fields) {
        self.state.write().values.extend(values);
    }

    pub fn add_context(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.write().values.insert(key.into(), value.into());
    }

    pub fn remove_context(&self, key: &str) -> Option<Value> {
        self.state.write().values.remove(key)
    }

    pub fn clear_context(&self) {
        self.state.write().values.clear();
    }

    pub fn context(&self) -> Fields {
        self.state.read().values.clone()
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        self.state.write().user_id = user_id;
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.read().user_id.clone()
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.state.write().session_id = session_id.into();
    }

    pub fn session_id(&self) -> String {
        self.state.read().session_id.clone()
    }

    /// Take a consistent copy of everything under one read lock
    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state.read();
        ContextSnapshot {
            values: (!state.values.is_empty()).then(|| state.values.clone()),
            user_id: state.user_id.clone(),
            session_id: state.session_id.clone(),
        }
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_is_stable() {
        let ctx = GlobalContext::new();
        let first = ctx.session_id();
        assert_eq!(first.len(), 32);
        assert_eq!(ctx.session_id(), first);

        ctx.set_session_id("override");
        assert_eq!(ctx.session_id(), "override");
    }

    #[test]
    fn test_set_merge_remove() {
        let ctx = GlobalContext::new();
        ctx.add_context("a", 1);
        let mut more = Fields::new();
        more.insert("a".into(), json!(2));
        more.insert("b".into(), json!("x"));
        ctx.merge_context(more);

        let values = ctx.context();
        assert_eq!(values["a"], json!(2));
        assert_eq!(values["b"], json!("x"));

        assert_eq!(ctx.remove_context("a"), Some(json!(2)));
        assert!(!ctx.context().contains_key("a"));

        ctx.set_context(Fields::new());
        assert!(ctx.context().is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let ctx = GlobalContext::new();
        ctx.add_context("screen", "home");
        ctx.set_user_id(Some("u-1".into()));

        let snap = ctx.snapshot();
        ctx.add_context("screen", "settings");
        ctx.set_user_id(None);

        assert_eq!(snap.values.unwrap()["screen"], json!("home"));
        assert_eq!(snap.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_empty_context_snapshot_is_none() {
        let ctx = GlobalContext::new();
        assert!(ctx.snapshot().values.is_none());
    }
}

//! # Per-invocation Context
//!
//! A [`Context`] is the mutable record that flows through one chain
//! invocation. It is a dynamically-extensible key/value map: derive and
//! decorate steps merge new keys into it, later steps read them.
//!
//! The handle is cheap to clone; every clone points at the same record, so a
//! step can hand the context to its continuation and still observe what the
//! downstream steps wrote once the continuation returns.
//!
//! Keys inserted with [`Context::insert_fixed`] cannot be removed. Snapshot
//! isolation leaves such keys in place when it cleans up after a nested chain.

use crate::error::ChainError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// The key/value record carried by a [`Context`].
pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Default)]
struct ContextState {
    fields: Fields,
    fixed: HashSet<String>,
}

/// Shared, mutable per-invocation context.
///
/// # Example
///
/// ```rust
/// use kasane_core::Context;
/// use serde_json::json;
///
/// let ctx = Context::from(json!({ "a": 1 }));
/// ctx.insert("b", "x");
/// assert_eq!(ctx.to_value(), json!({ "a": 1, "b": "x" }));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    state: Arc<Mutex<ContextState>>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding the given fields.
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            state: Arc::new(Mutex::new(ContextState {
                fields,
                fixed: HashSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().fields.get(key).cloned()
    }

    /// Get the value stored under `key`, deserialized into `T`.
    ///
    /// Returns `None` when the key is missing or has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Check whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().fields.contains_key(key)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.lock().fields.insert(key.into(), value.into())
    }

    /// Insert a value that [`Context::remove`] will refuse to remove.
    pub fn insert_fixed(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let mut state = self.lock();
        state.fixed.insert(key.clone());
        state.fields.insert(key, value.into())
    }

    /// Whether `key` may be removed. Missing keys count as removable.
    pub fn is_removable(&self, key: &str) -> bool {
        !self.lock().fixed.contains(key)
    }

    /// Remove a key, returning its value.
    ///
    /// Fixed keys are left in place and `None` is returned.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        if state.fixed.contains(key) {
            return None;
        }
        state.fields.shift_remove(key)
    }

    /// Merge every field of `fields` into the context, overwriting existing keys.
    pub fn merge(&self, fields: Fields) {
        let mut state = self.lock();
        for (key, value) in fields {
            state.fields.insert(key, value);
        }
    }

    /// Merge the output of a derive step.
    ///
    /// Objects are merged key by key, `null` is ignored, anything else is an
    /// [`ChainError::InvalidEnrichment`].
    pub fn enrich(&self, value: Value) -> Result<(), ChainError> {
        match value {
            Value::Object(fields) => {
                self.merge(fields);
                Ok(())
            }
            Value::Null => Ok(()),
            other => Err(ChainError::InvalidEnrichment(value_kind(&other))),
        }
    }

    /// The current keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().fields.keys().cloned().collect()
    }

    /// A copy of all current fields.
    pub fn fields(&self) -> Fields {
        self.lock().fields.clone()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.lock().fields.len()
    }

    /// Whether the context has no keys.
    pub fn is_empty(&self) -> bool {
        self.lock().fields.is_empty()
    }

    /// The current fields as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields())
    }
}

impl From<Fields> for Context {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}

/// Objects become the context's fields; any other value yields an empty context.
impl From<Value> for Context {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::from_fields(fields),
            _ => Self::new(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("fields", &self.lock().fields)
            .finish()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_state() {
        let ctx = Context::new();
        let other = ctx.clone();
        other.insert("user", 7);
        assert_eq!(ctx.get("user"), Some(json!(7)));
    }

    #[test]
    fn test_fixed_keys_are_not_removable() {
        let ctx = Context::new();
        ctx.insert_fixed("pinned", true);
        ctx.insert("loose", 1);

        assert!(!ctx.is_removable("pinned"));
        assert_eq!(ctx.remove("pinned"), None);
        assert_eq!(ctx.remove("loose"), Some(json!(1)));
        assert_eq!(ctx.keys(), vec!["pinned".to_string()]);
    }

    #[test]
    fn test_enrich_merges_objects() {
        let ctx = Context::from(json!({ "a": 1 }));
        ctx.enrich(json!({ "b": "x", "a": 2 })).unwrap();
        ctx.enrich(Value::Null).unwrap();
        assert_eq!(ctx.to_value(), json!({ "a": 2, "b": "x" }));
    }

    #[test]
    fn test_enrich_rejects_scalars() {
        let ctx = Context::new();
        let err = ctx.enrich(json!(3)).unwrap_err();
        assert!(matches!(err, ChainError::InvalidEnrichment("number")));
    }

    #[test]
    fn test_get_as_typed() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct User {
            id: u64,
        }

        let ctx = Context::from(json!({ "user": { "id": 4 } }));
        assert_eq!(ctx.get_as::<User>("user"), Some(User { id: 4 }));
        assert_eq!(ctx.get_as::<String>("user"), None);
    }
}

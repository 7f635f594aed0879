//! Call-scoped extra fields for the completion log record.
//!
//! The completion logger creates one [`EntryFields`] per call and stores it
//! in the call context. Any later stage, or the business handler, may append
//! key/value pairs; the completion logger merges them into its single record
//! when the call ends.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Field names the completion record owns. Appending one of these is a usage error.
pub const RESERVED_FIELDS: [&str; 7] = [
    "duration",
    "response_status",
    "response_status_string",
    "request_object",
    "response_object",
    "error",
    "message",
];

/// Errors from appending entry fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryFieldsError {
    #[error("cannot find entry logger in the call context, did you forget to chain the entry logs layer?")]
    NotInScope,
    #[error("field `{key}` is reserved for the completion record")]
    ReservedField { key: String },
}

/// Shared, append-only field set. Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct EntryFields {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl EntryFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a field set without reserved-name validation (stage-owned fields).
    pub(crate) fn from_map(map: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Sets `key` to `value`. Re-setting a key replaces the earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`EntryFieldsError::ReservedField`] for a reserved name.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), EntryFieldsError> {
        let key = key.into();
        check_key(&key)?;
        self.inner.lock().insert(key, value.into());
        Ok(())
    }

    /// Sets every pair, or none of them if any key is reserved.
    ///
    /// # Errors
    ///
    /// Returns [`EntryFieldsError::ReservedField`] naming the first reserved key.
    pub fn extend<I, K, V>(&self, fields: I) -> Result<(), EntryFieldsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let fields: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (key, _) in &fields {
            check_key(key)?;
        }
        self.inner.lock().extend(fields);
        Ok(())
    }

    /// Copy of the current fields.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

fn check_key(key: &str) -> Result<(), EntryFieldsError> {
    if RESERVED_FIELDS.contains(&key) {
        return Err(EntryFieldsError::ReservedField {
            key: key.to_string(),
        });
    }
    Ok(())
}

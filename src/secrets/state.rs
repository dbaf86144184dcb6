//! Per-resource private state: opaque byte blobs keyed by name, scoped to one
//! managed resource instance.

use crate::error::{PolicyError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Byte-blob storage owned by the surrounding resource lifecycle.
///
/// Implementations do no locking across calls; the caller guarantees a
/// single writer per resource.
pub trait PrivateState: Send + Sync {
    /// `Ok(None)` when nothing has been stored under `key` yet.
    fn get_key(&self, resource: &str, key: &str) -> Result<Option<Vec<u8>>>;

    fn set_key(&self, resource: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Drop everything stored for `resource`.
    fn clear(&self, resource: &str) -> Result<()>;
}

impl<T: PrivateState + ?Sized> PrivateState for Arc<T> {
    fn get_key(&self, resource: &str, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get_key(resource, key)
    }

    fn set_key(&self, resource: &str, key: &str, value: &[u8]) -> Result<()> {
        (**self).set_key(resource, key, value)
    }

    fn clear(&self, resource: &str) -> Result<()> {
        (**self).clear(resource)
    }
}

/// Reject reserved key names and values that are not JSON.
///
/// Keys starting with `.` belong to the hosting framework.
pub fn validate_entry(key: &str, value: &[u8]) -> Result<()> {
    if key.is_empty() || key.starts_with('.') {
        return Err(PolicyError::ReservedKey {
            key: key.to_string(),
        });
    }
    serde_json::from_slice::<serde::de::IgnoredAny>(value)
        .map_err(|e| PolicyError::decode("private state value", e))?;
    Ok(())
}

/// In-process private state, for tests and dry runs.
#[derive(Default)]
pub struct MemoryState {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrivateState for MemoryState {
    fn get_key(&self, resource: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .get(&(resource.to_string(), key.to_string()))
            .cloned())
    }

    fn set_key(&self, resource: &str, key: &str, value: &[u8]) -> Result<()> {
        validate_entry(key, value)?;
        self.entries
            .lock()
            .insert((resource.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn clear(&self, resource: &str) -> Result<()> {
        self.entries.lock().retain(|(r, _), _| r != resource);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_none() {
        let state = MemoryState::new();
        assert!(state.get_key("res", "secrets").unwrap().is_none());
    }

    #[test]
    fn set_then_get_is_scoped_by_resource() {
        let state = MemoryState::new();
        state.set_key("a", "secrets", br#"{"x":1}"#).unwrap();
        assert_eq!(
            state.get_key("a", "secrets").unwrap().as_deref(),
            Some(&br#"{"x":1}"#[..])
        );
        assert!(state.get_key("b", "secrets").unwrap().is_none());
    }

    #[test]
    fn reserved_keys_are_rejected() {
        let state = MemoryState::new();
        for key in ["", ".framework"] {
            let err = state.set_key("a", key, b"{}").unwrap_err();
            assert!(matches!(err, PolicyError::ReservedKey { .. }), "{key:?}");
        }
    }

    #[test]
    fn non_json_values_are_rejected() {
        let state = MemoryState::new();
        let err = state.set_key("a", "secrets", b"not json").unwrap_err();
        assert!(matches!(err, PolicyError::Decode { .. }));
    }

    #[test]
    fn clear_only_touches_one_resource() {
        let state = MemoryState::new();
        state.set_key("a", "secrets", b"{}").unwrap();
        state.set_key("b", "secrets", b"{}").unwrap();
        state.clear("a").unwrap();
        assert!(state.get_key("a", "secrets").unwrap().is_none());
        assert!(state.get_key("b", "secrets").unwrap().is_some());
    }
}

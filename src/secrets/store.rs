//! Secret reference store: which plaintext a server-side secret id stands
//! for, remembered per resource across runs.

use super::state::PrivateState;
use crate::error::{PolicyError, Result};
use crate::variables::{Value, VariableSet};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Private state key the store is persisted under.
pub const SECRETS_KEY: &str = "secrets";

/// Reference id -> plaintext, loaded at the start of a lifecycle pass and
/// saved at its end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretStore {
    entries: VariableSet,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store for `resource`. A missing blob is an empty store.
    pub fn load(state: &dyn PrivateState, resource: &str) -> Result<Self> {
        let Some(bytes) = state.get_key(resource, SECRETS_KEY)? else {
            debug!(resource, "no secret store yet");
            return Ok(Self::new());
        };

        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|e| PolicyError::decode("persisted secret store", e))?;
        let entries = raw
            .into_iter()
            .map(|(id, v)| (id, Value::from_plain_json(v)))
            .collect::<VariableSet>();

        debug!(resource, entries = entries.len(), "secret store loaded");
        Ok(Self { entries })
    }

    /// Persist the store for `resource`. Any failure is fatal to the pass:
    /// a lost mapping would show up later as drift nobody can explain.
    pub fn save(&self, state: &dyn PrivateState, resource: &str) -> Result<()> {
        let json = crate::variables::set_to_json(&self.entries);
        let bytes = serde_json::to_vec(&json).map_err(|e| PolicyError::Persist(e.to_string()))?;
        state
            .set_key(resource, SECRETS_KEY, &bytes)
            .map_err(|e| PolicyError::Persist(e.to_string()))?;
        debug!(resource, entries = self.entries.len(), "secret store saved");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id)
    }

    pub fn put(&mut self, id: impl Into<String>, value: Value) {
        self.entries.insert(id.into(), value);
    }

    /// Keep only ids in `live`; returns the ids that were dropped.
    pub fn prune(&mut self, live: &BTreeSet<String>) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            self.entries.remove(id);
        }
        stale
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mask a plaintext for display, keeping two characters at each end.
pub fn redact(value: &Value) -> String {
    let text = match value {
        Value::Scalar(crate::variables::Scalar::String(s)) => s.clone(),
        other => other.to_json().to_string(),
    };
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

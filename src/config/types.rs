use super::defaults::*;
use crate::reconcile::UnresolvedSecretPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Fleet
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Kibana space; `None` targets the default space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            username: None,
            password: None,
            space_id: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_FLEET_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    /// SQLite file holding per-resource private state. Defaults to
    /// `<state dir>/private-state.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ============================================================================
// Reconcile
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileConfig {
    #[serde(default)]
    pub unresolved_secrets: UnresolvedSecretPolicy,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            unresolved_secrets: UnresolvedSecretPolicy::default(),
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

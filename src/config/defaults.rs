//! Default configuration constants.

/// Default Kibana endpoint hosting the Fleet API.
pub const DEFAULT_FLEET_ENDPOINT: &str = "http://localhost:5601";

/// Default per-request timeout against the Fleet API.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of resources reconciled at once by `batch`.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default log level for this crate.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// File name of the private state database inside the state directory.
pub const STATE_DB_FILENAME: &str = "private-state.db";

/// Maximum size for a config file (1 MiB).
pub const MAX_CONFIG_FILE_BYTES: u64 = 1024 * 1024;

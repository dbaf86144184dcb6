//! Secret reference persistence.
//!
//! Fleet replaces secret variables with opaque ids in its responses. The
//! [`SecretStore`] remembers which plaintext each id stands for, persisted
//! through a [`PrivateState`] scoped to the managed resource.

pub mod sqlite;
pub mod state;
pub mod store;

pub use sqlite::SqliteState;
pub use state::{MemoryState, PrivateState};
pub use store::{redact, SecretStore, SECRETS_KEY};

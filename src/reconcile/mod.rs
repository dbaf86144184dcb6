//! Reconciliation of Fleet responses against declared requests and the
//! persisted secret store, plus input order stabilization.

mod reconciler;
mod stabilize;

pub use reconciler::{extract_incoming, reconcile_outgoing, ReconcileReport, UnresolvedSecretPolicy};
pub use stabilize::{sort_by_reference, sort_inputs};

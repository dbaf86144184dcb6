//! Applying many resources in one run.

use super::{PolicyApi, PolicyResource, Reconciled};
use crate::error::{PolicyError, Result};
use crate::policy::PolicyModel;
use crate::secrets::PrivateState;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub resource: String,
    pub plan: PolicyModel,
    /// Cached model from the previous run; `None` means create.
    pub prior: Option<PolicyModel>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub resource: String,
    pub result: Result<Reconciled>,
}

/// Create or update every item, at most `max_parallel` at a time.
///
/// Each resource gets its own pass and its own secret store. A resource
/// handle may appear only once, so no two passes ever write the same store.
/// Individual failures are reported per item and do not stop the others.
pub async fn apply_all<A: PolicyApi, S: PrivateState>(
    resource: &PolicyResource<A, S>,
    items: Vec<BatchItem>,
    max_parallel: usize,
) -> Result<Vec<BatchOutcome>> {
    let mut seen = HashSet::new();
    for item in &items {
        if !seen.insert(item.resource.as_str()) {
            return Err(PolicyError::DuplicateResource(item.resource.clone()));
        }
    }

    info!(resources = items.len(), max_parallel, "applying batch");

    let outcomes: Vec<BatchOutcome> = stream::iter(items)
        .map(|item| async move {
            let result = match &item.prior {
                Some(prior) => resource.update(&item.resource, &item.plan, prior).await,
                None => resource.create(&item.resource, &item.plan).await,
            };
            if let Err(e) = &result {
                error!(resource = %item.resource, "apply failed: {e}");
            }
            BatchOutcome {
                resource: item.resource,
                result,
            }
        })
        .buffer_unordered(max_parallel.max(1))
        .collect()
        .await;

    Ok(outcomes)
}

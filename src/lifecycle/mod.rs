//! Resource lifecycle passes: create, read, update, delete.
//!
//! Each pass is self-contained: load the secret store for the resource,
//! call the API, reconcile, build the model, save the store. A failed save
//! fails the pass. On create and update the store is saved before unresolved
//! references are enforced, and a rejection carries the written model.

use crate::error::{PolicyError, Result};
use crate::policy::{populate_from_response, to_request, PolicyModel, PolicyRequest, PolicyResponse};
use crate::reconcile::{extract_incoming, reconcile_outgoing, ReconcileReport, UnresolvedSecretPolicy};
use crate::secrets::{PrivateState, SecretStore};
use async_trait::async_trait;
use tracing::{debug, info};

mod batch;

pub use batch::{apply_all, BatchItem, BatchOutcome};

/// Transport seam to the Fleet package policy API.
///
/// Errors are returned as-is by the lifecycle; retries, timeouts and
/// cancellation belong to the implementation.
#[async_trait]
pub trait PolicyApi: Send + Sync {
    async fn create_policy(&self, request: &PolicyRequest) -> Result<PolicyResponse>;

    /// `Ok(None)` when the policy no longer exists.
    async fn get_policy(&self, id: &str) -> Result<Option<PolicyResponse>>;

    async fn update_policy(&self, id: &str, request: &PolicyRequest) -> Result<PolicyResponse>;

    /// Deleting a policy that is already gone succeeds.
    async fn delete_policy(&self, id: &str) -> Result<()>;
}

/// Result of a pass that produced a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub model: PolicyModel,
    pub report: ReconcileReport,
}

/// Drives lifecycle passes for any number of resources. Holds no
/// per-resource state; `resource` names the private state scope.
pub struct PolicyResource<A, S> {
    api: A,
    state: S,
    unresolved: UnresolvedSecretPolicy,
}

impl<A: PolicyApi, S: PrivateState> PolicyResource<A, S> {
    pub fn new(api: A, state: S) -> Self {
        Self {
            api,
            state,
            unresolved: UnresolvedSecretPolicy::default(),
        }
    }

    pub fn with_unresolved_policy(mut self, policy: UnresolvedSecretPolicy) -> Self {
        self.unresolved = policy;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub async fn create(&self, resource: &str, plan: &PolicyModel) -> Result<Reconciled> {
        let request = to_request(plan);
        let response = self.api.create_policy(&request).await?;
        info!(resource, policy_id = %response.id, "integration policy created");
        self.finish_write(resource, &request, response, plan)
    }

    /// Refresh from the server. `Ok(None)` means the policy is gone; its
    /// private state is dropped along with it.
    pub async fn read(&self, resource: &str, prior: &PolicyModel) -> Result<Option<Reconciled>> {
        let id = prior.id.as_deref().ok_or(PolicyError::MissingId)?;
        let Some(mut response) = self.api.get_policy(id).await? else {
            info!(resource, policy_id = id, "integration policy no longer exists");
            self.state.clear(resource)?;
            return Ok(None);
        };

        let mut store = SecretStore::load(&self.state, resource)?;
        let report = extract_incoming(&mut response, &mut store);
        report.enforce(self.unresolved)?;
        let model = populate_from_response(response, Some(prior))?;
        store.save(&self.state, resource)?;

        debug!(
            resource,
            policy_id = id,
            resolved = report.resolved,
            unresolved = report.unresolved.len(),
            pruned = report.pruned.len(),
            "integration policy refreshed"
        );
        Ok(Some(Reconciled { model, report }))
    }

    pub async fn update(
        &self,
        resource: &str,
        plan: &PolicyModel,
        prior: &PolicyModel,
    ) -> Result<Reconciled> {
        let id = prior
            .id
            .as_deref()
            .or(plan.id.as_deref())
            .ok_or(PolicyError::MissingId)?;
        let request = to_request(plan);
        let response = self.api.update_policy(id, &request).await?;
        info!(resource, policy_id = id, "integration policy updated");
        self.finish_write(resource, &request, response, plan)
    }

    pub async fn delete(&self, resource: &str, prior: &PolicyModel) -> Result<()> {
        if let Some(id) = prior.id.as_deref() {
            self.api.delete_policy(id).await?;
            info!(resource, policy_id = id, "integration policy deleted");
        }
        self.state.clear(resource)?;
        Ok(())
    }

    fn finish_write(
        &self,
        resource: &str,
        request: &PolicyRequest,
        mut response: PolicyResponse,
        plan: &PolicyModel,
    ) -> Result<Reconciled> {
        let mut store = SecretStore::load(&self.state, resource)?;
        let report = reconcile_outgoing(request, &mut response, &mut store);
        let model = populate_from_response(response, Some(plan))?;
        store.save(&self.state, resource)?;

        debug!(
            resource,
            seeded = report.seeded,
            unresolved = report.unresolved.len(),
            pruned = report.pruned.len(),
            stored = store.len(),
            "secret references reconciled"
        );

        // The policy exists on the server by now; a rejection carries it.
        match report.enforce(self.unresolved) {
            Ok(()) => Ok(Reconciled { model, report }),
            Err(PolicyError::UnresolvedSecrets(unresolved)) => {
                Err(PolicyError::UnresolvedAfterWrite {
                    unresolved,
                    model: Box::new(model),
                })
            }
            Err(e) => Err(e),
        }
    }
}

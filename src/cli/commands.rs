//! Command implementations behind the CLI.
//!
//! Plans and cached models are files on disk; the private state lives in
//! the configured database.

use crate::error::PolicyError;
use crate::lifecycle::{apply_all, BatchItem, BatchOutcome, PolicyApi, PolicyResource};
use crate::policy::PolicyModel;
use crate::secrets::{redact, PrivateState, SecretStore};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Read a plan or cached model; YAML by extension, JSON otherwise.
pub fn read_model(path: &Path) -> Result<PolicyModel> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    let model = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in '{}'", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in '{}'", path.display()))?,
    };
    Ok(model)
}

fn read_prior(path: &Path) -> Result<Option<PolicyModel>> {
    if !path.exists() {
        return Ok(None);
    }
    read_model(path).map(Some)
}

pub fn write_model(path: &Path, model: &PolicyModel) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(model)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    Ok(())
}

pub async fn apply<A: PolicyApi, S: PrivateState>(
    resource: &PolicyResource<A, S>,
    handle: &str,
    plan: &Path,
    state: &Path,
) -> Result<()> {
    let plan = read_model(plan)?;
    let result = match read_prior(state)? {
        Some(prior) => resource.update(handle, &plan, &prior).await,
        None => resource.create(handle, &plan).await,
    };
    let reconciled = result.map_err(|e| keep_written_model(state, e))?;
    write_model(state, &reconciled.model)?;
    info!(
        resource = handle,
        policy_id = reconciled.model.id.as_deref().unwrap_or_default(),
        "applied"
    );
    Ok(())
}

pub async fn refresh<A: PolicyApi, S: PrivateState>(
    resource: &PolicyResource<A, S>,
    handle: &str,
    state: &Path,
) -> Result<()> {
    let Some(prior) = read_prior(state)? else {
        bail!("No cached model at '{}'", state.display());
    };
    match resource.read(handle, &prior).await? {
        Some(reconciled) => write_model(state, &reconciled.model)?,
        None => {
            warn!(resource = handle, "policy is gone, dropping cached model");
            std::fs::remove_file(state)
                .with_context(|| format!("Failed to remove '{}'", state.display()))?;
        }
    }
    Ok(())
}

pub async fn destroy<A: PolicyApi, S: PrivateState>(
    resource: &PolicyResource<A, S>,
    handle: &str,
    state: &Path,
) -> Result<()> {
    let prior = read_prior(state)?.unwrap_or_default();
    resource.delete(handle, &prior).await?;
    if state.exists() {
        std::fs::remove_file(state)
            .with_context(|| format!("Failed to remove '{}'", state.display()))?;
    }
    Ok(())
}

/// Plan files in `dir`, keyed by file stem.
pub fn discover_plans(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut plans = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_plan = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("yaml") | Some("yml")
        );
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if is_plan {
            plans.push((stem.to_string(), path.clone()));
        }
    }
    plans.sort();
    Ok(plans)
}

/// Returns the number of failed resources.
pub async fn batch<A: PolicyApi, S: PrivateState>(
    resource: &PolicyResource<A, S>,
    dir: &Path,
    state_dir: Option<&Path>,
    max_parallel: usize,
) -> Result<usize> {
    let state_dir = state_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.join(".state"));

    let mut items = Vec::new();
    for (handle, plan_path) in discover_plans(dir)? {
        let prior = read_prior(&state_dir.join(format!("{handle}.json")))?;
        items.push(BatchItem {
            resource: handle,
            plan: read_model(&plan_path)?,
            prior,
        });
    }

    let outcomes = apply_all(resource, items, max_parallel).await?;
    Ok(cache_outcomes(&state_dir, outcomes))
}

/// Write each cached model and report per resource. Returns the failure count.
///
/// A cache write failure counts against its own resource only; stopping early
/// would leave later resources created on the server with no cached model.
fn cache_outcomes(state_dir: &Path, outcomes: Vec<BatchOutcome>) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        let path = state_dir.join(format!("{}.json", outcome.resource));
        let written = match outcome.result {
            Ok(reconciled) => write_model(&path, &reconciled.model),
            Err(e) => Err(keep_written_model(&path, e)),
        };
        match written {
            Ok(()) => println!("{}: ok", outcome.resource),
            Err(e) => {
                failed += 1;
                error!(resource = %outcome.resource, "{e:#}");
                println!("{}: failed: {e:#}", outcome.resource);
            }
        }
    }
    failed
}

/// Cache the model a rejected write left on the server, then hand the
/// error on.
fn keep_written_model(path: &Path, err: PolicyError) -> anyhow::Error {
    if let PolicyError::UnresolvedAfterWrite { model, .. } = &err {
        if let Err(write_err) = write_model(path, model) {
            return write_err.context(err.to_string());
        }
    }
    err.into()
}

/// Secret ids held for `handle`, with redacted values.
pub fn state_lines(state: &dyn PrivateState, handle: &str) -> Result<Vec<String>> {
    let store = SecretStore::load(state, handle)?;
    Ok(store
        .ids()
        .filter_map(|id| store.get(id).map(|v| format!("{id}\t{}", redact(v))))
        .collect())
}

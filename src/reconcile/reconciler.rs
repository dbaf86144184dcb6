//! Secret reference reconciliation between request, response and store.

use crate::error::{PolicyError, Result};
use crate::policy::{PolicyRequest, PolicyResponse};
use crate::secrets::SecretStore;
use crate::variables::{unwrap_response, Value, VariableSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// What to do with a secret marker no stored plaintext matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedSecretPolicy {
    /// Keep the opaque marker in the model and carry on.
    #[default]
    Passthrough,
    /// Fail the lifecycle pass.
    Reject,
}

impl std::str::FromStr for UnresolvedSecretPolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "passthrough" => Ok(Self::Passthrough),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("invalid unresolved secret policy: {s}")),
        }
    }
}

/// Outcome of one reconciliation pass. Holds reference ids only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Markers replaced from the existing store.
    pub resolved: usize,
    /// Markers replaced from the request, with the store updated.
    pub seeded: usize,
    /// Marker ids left in place.
    pub unresolved: Vec<String>,
    /// Store ids dropped because the response no longer references them.
    pub pruned: Vec<String>,
}

impl ReconcileReport {
    pub fn enforce(&self, policy: UnresolvedSecretPolicy) -> Result<()> {
        if self.unresolved.is_empty() {
            return Ok(());
        }
        match policy {
            UnresolvedSecretPolicy::Passthrough => {
                warn!(
                    unresolved = ?self.unresolved,
                    "secret references without a known plaintext kept as-is"
                );
                Ok(())
            }
            UnresolvedSecretPolicy::Reject => {
                Err(PolicyError::UnresolvedSecrets(self.unresolved.clone()))
            }
        }
    }
}

/// Bare read: unwrap the response and substitute every marker the store
/// knows. Unknown markers stay opaque. The store is pruned to the markers
/// this response references.
pub fn extract_incoming(response: &mut PolicyResponse, store: &mut SecretStore) -> ReconcileReport {
    unwrap_response(response);
    let live = referenced_ids(response);

    let mut report = ReconcileReport::default();
    for_each_set(response, |set| {
        for value in set.values_mut() {
            resolve_from_store(value, store, &mut report);
        }
    });

    report.pruned = store.prune(&live);
    debug!(
        resolved = report.resolved,
        unresolved = report.unresolved.len(),
        pruned = report.pruned.len(),
        "incoming response reconciled"
    );
    report
}

/// After create/update: unwrap the response, walk it in lockstep with the
/// request that produced it, and for every marker under a declared key
/// remember the declared plaintext and put it back in the response.
///
/// Inputs and streams the request did not declare are server defaults; they
/// are kept as returned and nothing is remembered for them.
pub fn reconcile_outgoing(
    request: &PolicyRequest,
    response: &mut PolicyResponse,
    store: &mut SecretStore,
) -> ReconcileReport {
    unwrap_response(response);
    let live = referenced_ids(response);

    let mut report = ReconcileReport::default();

    if let Some(vars) = response.vars.as_mut() {
        walk_set(request.vars.as_ref(), vars, store, &mut report);
    }

    for (input_id, input) in response.inputs.iter_mut() {
        let Some(declared_input) = request.inputs.get(input_id) else {
            debug!(input = %input_id, "input added by server, absorbing as returned");
            note_unresolved_input(input, &mut report);
            continue;
        };

        if let Some(vars) = input.vars.as_mut() {
            walk_set(declared_input.vars.as_ref(), vars, store, &mut report);
        }

        for (stream_id, stream) in input.streams.iter_mut() {
            let Some(vars) = stream.vars.as_mut() else {
                continue;
            };
            match declared_input.streams.get(stream_id) {
                Some(declared_stream) => {
                    walk_set(declared_stream.vars.as_ref(), vars, store, &mut report);
                }
                None => {
                    debug!(
                        input = %input_id,
                        stream = %stream_id,
                        "stream added by server, absorbing as returned"
                    );
                    vars.values().for_each(|v| note_unresolved(v, &mut report));
                }
            }
        }
    }

    report.pruned = store.prune(&live);
    debug!(
        seeded = report.seeded,
        unresolved = report.unresolved.len(),
        pruned = report.pruned.len(),
        "outgoing request reconciled"
    );
    report
}

fn walk_set(
    declared: Option<&VariableSet>,
    response: &mut VariableSet,
    store: &mut SecretStore,
    report: &mut ReconcileReport,
) {
    for (key, value) in response.iter_mut() {
        let declared_value = declared.and_then(|d| d.get(key));
        walk_value(declared_value, value, store, report);
    }
}

fn walk_value(
    declared: Option<&Value>,
    value: &mut Value,
    store: &mut SecretStore,
    report: &mut ReconcileReport,
) {
    let replacement = match (&mut *value, declared) {
        (Value::SecretMarker { id }, Some(plain)) => {
            debug!(secret_ref = %id, "remembering declared value for secret reference");
            store.put(id.clone(), plain.clone());
            Some(plain.clone())
        }
        (Value::SecretMarker { id }, None) => {
            report.unresolved.push(id.clone());
            None
        }
        (Value::Nested(inner), Some(Value::Nested(declared_inner))) => {
            walk_set(Some(declared_inner), inner, store, report);
            None
        }
        (other, _) => {
            note_unresolved(other, report);
            None
        }
    };

    if let Some(plain) = replacement {
        *value = plain;
        report.seeded += 1;
    }
}

fn resolve_from_store(value: &mut Value, store: &SecretStore, report: &mut ReconcileReport) {
    let replacement = match &mut *value {
        Value::SecretMarker { id } => match store.get(id) {
            Some(plain) => Some(plain.clone()),
            None => {
                report.unresolved.push(id.clone());
                None
            }
        },
        Value::Sequence(items) => {
            items
                .iter_mut()
                .for_each(|item| resolve_from_store(item, store, report));
            None
        }
        Value::Nested(set) => {
            set.values_mut()
                .for_each(|item| resolve_from_store(item, store, report));
            None
        }
        Value::Envelope {
            value: Some(inner), ..
        } => {
            resolve_from_store(inner, store, report);
            None
        }
        Value::Envelope { value: None, .. } | Value::Scalar(_) => None,
    };

    if let Some(plain) = replacement {
        *value = plain;
        report.resolved += 1;
    }
}

fn note_unresolved(value: &Value, report: &mut ReconcileReport) {
    let mut ids = BTreeSet::new();
    value.collect_secret_refs(&mut ids);
    report.unresolved.extend(ids);
}

fn note_unresolved_input(input: &crate::policy::Input, report: &mut ReconcileReport) {
    let sets = input
        .vars
        .iter()
        .chain(input.streams.values().filter_map(|s| s.vars.as_ref()));
    for set in sets {
        set.values().for_each(|v| note_unresolved(v, report));
    }
}

/// Every marker id the (unwrapped) response references, anywhere.
fn referenced_ids(response: &PolicyResponse) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let sets = response.vars.iter().chain(response.inputs.values().flat_map(|input| {
        input
            .vars
            .iter()
            .chain(input.streams.values().filter_map(|s| s.vars.as_ref()))
    }));
    for set in sets {
        set.values().for_each(|v| v.collect_secret_refs(&mut ids));
    }
    ids
}

fn for_each_set(response: &mut PolicyResponse, mut f: impl FnMut(&mut VariableSet)) {
    if let Some(vars) = response.vars.as_mut() {
        f(vars);
    }
    for input in response.inputs.values_mut() {
        if let Some(vars) = input.vars.as_mut() {
            f(vars);
        }
        for stream in input.streams.values_mut() {
            if let Some(vars) = stream.vars.as_mut() {
                f(vars);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyRequest;
    use crate::variables::set_to_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(json: serde_json::Value) -> PolicyRequest {
        let mut base = json!({
            "name": "nginx-1",
            "namespace": "default",
            "package": {"name": "nginx", "version": "1.20.0"}
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), json.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    fn response(json: serde_json::Value) -> PolicyResponse {
        let mut base = json!({"id": "p-1", "name": "nginx-1", "namespace": "default"});
        if let (Some(base), Some(extra)) = (base.as_object_mut(), json.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn secret_marker_is_seeded_from_request() {
        let req = request(json!({"vars": {"k": "s3kr3t"}}));
        let mut resp = response(json!({"vars": {"k": {"id": "ref-1", "isSecretRef": true}}}));
        let mut store = SecretStore::new();

        let report = reconcile_outgoing(&req, &mut resp, &mut store);

        assert_eq!(store.get("ref-1"), Some(&Value::from("s3kr3t")));
        assert_eq!(resp.vars.as_ref().unwrap()["k"], Value::from("s3kr3t"));
        assert_eq!(report.seeded, 1);
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn wrapped_marker_is_seeded_too() {
        let req = request(json!({"vars": {"k": "s3kr3t"}}));
        let mut resp = response(json!({
            "vars": {"k": {"type": "password", "value": {"id": "ref-1", "isSecretRef": true}}}
        }));
        let mut store = SecretStore::new();

        reconcile_outgoing(&req, &mut resp, &mut store);
        assert_eq!(resp.vars.as_ref().unwrap()["k"], Value::from("s3kr3t"));
        assert_eq!(store.get("ref-1"), Some(&Value::from("s3kr3t")));
    }

    #[test]
    fn stale_ids_are_pruned() {
        let req = request(json!({"vars": {"k": "new"}}));
        let mut resp = response(json!({"vars": {"k": {"id": "ref-1", "isSecretRef": true}}}));
        let mut store = SecretStore::new();
        store.put("ref-0", Value::from("old"));

        let report = reconcile_outgoing(&req, &mut resp, &mut store);

        assert!(store.get("ref-0").is_none());
        assert_eq!(report.pruned, vec!["ref-0".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn plaintext_round_trips_through_both_passes() {
        let declared = json!({
            "vars": {"host": "localhost", "port": 9200, "tags": ["a", "b"]},
            "inputs": {
                "logs": {
                    "enabled": true,
                    "vars": {"paths": ["/var/log/*.log"]},
                    "streams": {"nginx.access": {"vars": {"ignore_older": "72h"}}}
                }
            }
        });
        let req = request(declared.clone());
        let mut resp = response(json!({
            "vars": {
                "host": {"type": "text", "value": "localhost"},
                "port": {"type": "integer", "value": 9200},
                "tags": {"type": "text", "value": ["a", "b"]}
            },
            "inputs": {
                "logs": {
                    "enabled": true,
                    "vars": {"paths": {"type": "text", "value": ["/var/log/*.log"]}},
                    "streams": {"nginx.access": {"vars": {"ignore_older": {"type": "text", "value": "72h"}}}}
                }
            }
        }));
        let mut store = SecretStore::new();

        reconcile_outgoing(&req, &mut resp, &mut store);
        let report = extract_incoming(&mut resp, &mut store);

        assert_eq!(report, ReconcileReport::default());
        assert_eq!(set_to_json(resp.vars.as_ref().unwrap()), declared["vars"]);
        let logs = &resp.inputs["logs"];
        assert_eq!(
            set_to_json(logs.vars.as_ref().unwrap()),
            declared["inputs"]["logs"]["vars"]
        );
        assert_eq!(
            set_to_json(logs.streams["nginx.access"].vars.as_ref().unwrap()),
            declared["inputs"]["logs"]["streams"]["nginx.access"]["vars"]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn envelope_shaped_plaintext_round_trips() {
        let declared = json!({
            "proc": {"type": "drop_event"},
            "pair": {"type": "a", "value": "b"},
            "list": [{"type": "x"}, {"type": "y", "value": 1}],
            "deep": {"filter": {"type": "drop_fields", "value": ["a"]}}
        });
        let wrapped: serde_json::Map<String, serde_json::Value> = declared
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), json!({"type": "yaml", "value": v})))
            .collect();
        let req = request(json!({"vars": declared}));
        let mut resp = response(json!({"vars": wrapped}));
        let mut store = SecretStore::new();

        reconcile_outgoing(&req, &mut resp, &mut store);
        let report = extract_incoming(&mut resp, &mut store);

        assert_eq!(report, ReconcileReport::default());
        assert_eq!(set_to_json(resp.vars.as_ref().unwrap()), declared);
    }

    #[test]
    fn marker_shaped_plaintext_round_trips() {
        let declared = json!({"ref": {"id": "x", "isSecretRef": true}});
        let req = request(json!({"vars": declared}));
        let raw = json!({"vars": {"ref": {"type": "yaml", "value": {"id": "x", "isSecretRef": true}}}});
        let mut store = SecretStore::new();

        let mut written = response(raw.clone());
        reconcile_outgoing(&req, &mut written, &mut store);
        assert_eq!(set_to_json(written.vars.as_ref().unwrap()), declared);

        let mut refreshed = response(raw);
        let report = extract_incoming(&mut refreshed, &mut store);
        assert!(report.unresolved.is_empty());
        assert_eq!(set_to_json(refreshed.vars.as_ref().unwrap()), declared);
    }

    #[test]
    fn lockstep_covers_inputs_and_streams() {
        let req = request(json!({
            "inputs": {
                "logs": {
                    "vars": {"api_key": "input-secret"},
                    "streams": {"s1": {"vars": {"token": "stream-secret"}}}
                }
            }
        }));
        let mut resp = response(json!({
            "inputs": {
                "logs": {
                    "vars": {"api_key": {"type": "password", "value": {"id": "in-1", "isSecretRef": true}}},
                    "streams": {"s1": {"vars": {"token": {"id": "st-1", "isSecretRef": true}}}}
                }
            }
        }));
        let mut store = SecretStore::new();

        let report = reconcile_outgoing(&req, &mut resp, &mut store);

        assert_eq!(report.seeded, 2);
        assert_eq!(store.get("in-1"), Some(&Value::from("input-secret")));
        assert_eq!(store.get("st-1"), Some(&Value::from("stream-secret")));
        let logs = &resp.inputs["logs"];
        assert_eq!(logs.vars.as_ref().unwrap()["api_key"], Value::from("input-secret"));
        assert_eq!(
            logs.streams["s1"].vars.as_ref().unwrap()["token"],
            Value::from("stream-secret")
        );
    }

    #[test]
    fn lockstep_recurses_into_nested_sets() {
        let req = request(json!({"vars": {"auth": {"user": "u", "password": "pw"}}}));
        let mut resp = response(json!({
            "vars": {"auth": {"type": "yaml", "value": {
                "user": "u",
                "password": {"id": "ref-9", "isSecretRef": true}
            }}}
        }));
        let mut store = SecretStore::new();

        reconcile_outgoing(&req, &mut resp, &mut store);
        assert_eq!(store.get("ref-9"), Some(&Value::from("pw")));
        assert_eq!(
            set_to_json(resp.vars.as_ref().unwrap()),
            json!({"auth": {"user": "u", "password": "pw"}})
        );
    }

    #[test]
    fn server_added_defaults_are_absorbed_without_store_writes() {
        let req = request(json!({"inputs": {"logs": {"enabled": true}}}));
        let mut resp = response(json!({
            "vars": {"default_secret": {"id": "ref-d", "isSecretRef": true}},
            "inputs": {
                "logs": {
                    "enabled": true,
                    "streams": {"extra": {"vars": {"level": {"type": "text", "value": "info"}}}}
                },
                "metrics": {
                    "enabled": false,
                    "vars": {"period": {"type": "text", "value": "10s"},
                             "token": {"id": "ref-m", "isSecretRef": true}}
                }
            }
        }));
        let mut store = SecretStore::new();

        let report = reconcile_outgoing(&req, &mut resp, &mut store);

        assert!(store.is_empty());
        assert_eq!(report.seeded, 0);
        assert_eq!(report.unresolved, vec!["ref-d".to_string(), "ref-m".to_string()]);
        assert_eq!(resp.vars.as_ref().unwrap()["default_secret"], Value::marker("ref-d"));
        let metrics = resp.inputs["metrics"].vars.as_ref().unwrap();
        assert_eq!(metrics["period"], Value::from("10s"));
        assert_eq!(
            resp.inputs["logs"].streams["extra"].vars.as_ref().unwrap()["level"],
            Value::from("info")
        );
    }

    #[test]
    fn undeclared_marker_keeps_existing_store_entry() {
        let req = request(json!({"vars": {}}));
        let mut resp = response(json!({"vars": {"k": {"id": "ref-1", "isSecretRef": true}}}));
        let mut store = SecretStore::new();
        store.put("ref-1", Value::from("earlier"));

        reconcile_outgoing(&req, &mut resp, &mut store);
        assert_eq!(store.get("ref-1"), Some(&Value::from("earlier")));
        assert_eq!(resp.vars.as_ref().unwrap()["k"], Value::marker("ref-1"));
    }

    #[test]
    fn extract_substitutes_known_markers() {
        let mut store = SecretStore::new();
        store.put("ref-1", Value::from("s3kr3t"));
        let mut resp = response(json!({
            "vars": {
                "k": {"type": "password", "value": {"id": "ref-1", "isSecretRef": true}},
                "list": [{"id": "ref-1", "isSecretRef": true}]
            }
        }));

        let report = extract_incoming(&mut resp, &mut store);

        assert_eq!(report.resolved, 2);
        assert_eq!(
            set_to_json(resp.vars.as_ref().unwrap()),
            json!({"k": "s3kr3t", "list": ["s3kr3t"]})
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn extract_leaves_unknown_markers_opaque() {
        let mut store = SecretStore::new();
        store.put("ref-stale", Value::from("gone"));
        let mut resp = response(json!({"vars": {"k": {"id": "ref-2", "isSecretRef": true}}}));

        let report = extract_incoming(&mut resp, &mut store);

        assert_eq!(resp.vars.as_ref().unwrap()["k"], Value::marker("ref-2"));
        assert_eq!(report.unresolved, vec!["ref-2".to_string()]);
        assert_eq!(report.pruned, vec!["ref-stale".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn enforce_follows_policy() {
        let report = ReconcileReport {
            unresolved: vec!["ref-2".into()],
            ..Default::default()
        };
        assert!(report.enforce(UnresolvedSecretPolicy::Passthrough).is_ok());
        let err = report.enforce(UnresolvedSecretPolicy::Reject).unwrap_err();
        assert!(matches!(err, PolicyError::UnresolvedSecrets(ids) if ids == vec!["ref-2".to_string()]));

        assert!(ReconcileReport::default()
            .enforce(UnresolvedSecretPolicy::Reject)
            .is_ok());
    }
}

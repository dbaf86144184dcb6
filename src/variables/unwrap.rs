//! Envelope stripping.
//!
//! Every `{type, value}` envelope is replaced by its value, recursively.
//! Envelopes without a value disappear along with their key (or sequence
//! slot). Secret markers are left for the reconciler.

use super::value::{Value, VariableSet};
use crate::policy::PolicyResponse;
use tracing::trace;

/// Unwrap a single node. `None` means the node carried no value and must be
/// dropped by its container.
pub fn unwrap_value(value: Value) -> Option<Value> {
    match value {
        Value::Envelope {
            value: Some(inner), ..
        } => unwrap_value(*inner),
        Value::Envelope { value: None, .. } => None,
        Value::Sequence(items) => Some(Value::Sequence(
            items.into_iter().filter_map(unwrap_value).collect(),
        )),
        Value::Nested(set) => Some(Value::Nested(unwrap_set(set))),
        v @ (Value::Scalar(_) | Value::SecretMarker { .. }) => Some(v),
    }
}

pub fn unwrap_set(set: VariableSet) -> VariableSet {
    set.into_iter()
        .filter_map(|(key, value)| match unwrap_value(value) {
            Some(v) => Some((key, v)),
            None => {
                trace!(key = %key, "dropping value-less envelope");
                None
            }
        })
        .collect()
}

fn unwrap_vars(vars: &mut Option<VariableSet>) -> usize {
    match vars.take() {
        Some(set) => {
            *vars = Some(unwrap_set(set));
            1
        }
        None => 0,
    }
}

/// Unwrap the top-level vars, then every input's vars, then every stream's
/// vars. Returns how many variable sets were present and visited.
pub fn unwrap_response(response: &mut PolicyResponse) -> usize {
    let mut visited = unwrap_vars(&mut response.vars);
    for input in response.inputs.values_mut() {
        visited += unwrap_vars(&mut input.vars);
        for stream in input.streams.values_mut() {
            visited += unwrap_vars(&mut stream.vars);
        }
    }
    visited
}

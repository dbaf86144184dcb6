//! Model <-> wire conversion.

use super::types::{
    InputModel, PackageRef, PolicyModel, PolicyRequest, PolicyResponse, RequestInput,
    RequestStream, StreamModel,
};
use crate::error::{PolicyError, Result};
use crate::reconcile::sort_inputs;

/// Build the create/update body from the declared model.
pub fn to_request(model: &PolicyModel) -> PolicyRequest {
    let inputs = model
        .inputs
        .iter()
        .map(|input| {
            let streams = input
                .streams
                .iter()
                .map(|(id, stream)| {
                    (
                        id.clone(),
                        RequestStream {
                            enabled: stream.enabled,
                            vars: stream.vars.clone(),
                        },
                    )
                })
                .collect();
            (
                input.input_id.clone(),
                RequestInput {
                    enabled: input.enabled,
                    vars: input.vars.clone(),
                    streams,
                },
            )
        })
        .collect();

    PolicyRequest {
        name: model.name.clone(),
        namespace: model.namespace.clone(),
        agent_policy_id: model.agent_policy_id.clone(),
        description: model.description.clone(),
        enabled: model.enabled,
        force: model.force,
        package: PackageRef {
            name: model.integration_name.clone(),
            version: model.integration_version.clone(),
        },
        output_id: model.output_id.clone(),
        vars: model.vars.clone(),
        inputs,
    }
}

/// Turn a reconciled response into the model to cache.
///
/// `prior` supplies fields the server does not echo back (`force`) and the
/// input order to stabilize against.
pub fn populate_from_response(
    response: PolicyResponse,
    prior: Option<&PolicyModel>,
) -> Result<PolicyModel> {
    let package = match (response.package, prior) {
        (Some(package), _) => package,
        (None, Some(prior)) => PackageRef {
            name: prior.integration_name.clone(),
            version: prior.integration_version.clone(),
        },
        (None, None) => {
            return Err(PolicyError::Shape(format!(
                "policy {} has no package",
                response.id
            )))
        }
    };

    let incoming: Vec<InputModel> = response
        .inputs
        .into_iter()
        .map(|(input_id, input)| InputModel {
            input_id,
            enabled: input.enabled,
            vars: input.vars,
            streams: input
                .streams
                .into_iter()
                .map(|(id, stream)| {
                    (
                        id,
                        StreamModel {
                            enabled: stream.enabled,
                            vars: stream.vars,
                        },
                    )
                })
                .collect(),
        })
        .collect();

    let inputs = match prior {
        Some(prior) => sort_inputs(incoming, &prior.inputs),
        None => incoming,
    };

    Ok(PolicyModel {
        id: Some(response.id),
        name: response.name,
        namespace: response.namespace,
        agent_policy_id: response.agent_policy_id,
        description: response.description,
        enabled: response.enabled,
        force: prior.and_then(|p| p.force),
        integration_name: package.name,
        integration_version: package.version,
        output_id: response.output_id,
        vars: response.vars,
        inputs,
    })
}

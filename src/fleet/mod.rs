//! HTTP transport for the Fleet package policy and output APIs.

use crate::config::FleetConfig;
use crate::error::{PolicyError, Result, TransportError};
use crate::lifecycle::PolicyApi;
use crate::policy::{Output, PolicyRequest, PolicyResponse};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const PACKAGE_POLICIES_PATH: &str = "/api/fleet/package_policies";
const OUTPUTS_PATH: &str = "/api/fleet/outputs";

#[derive(Debug, Clone)]
enum FleetAuth {
    Anonymous,
    ApiKey(String),
    Basic { username: String, password: String },
}

/// Fleet response envelope: `{"item": ...}`.
#[derive(Deserialize)]
struct Item<T> {
    item: T,
}

pub struct FleetClient {
    endpoint: String,
    space_prefix: String,
    auth: FleetAuth,
    client: Client,
}

impl FleetClient {
    pub fn new(config: &FleetConfig) -> std::result::Result<Self, TransportError> {
        Url::parse(&config.endpoint)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.endpoint)))?;

        let auth = match (&config.api_key, &config.username, &config.password) {
            (Some(key), _, _) => FleetAuth::ApiKey(key.clone()),
            (None, Some(username), Some(password)) => FleetAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => FleetAuth::Anonymous,
        };

        let space_prefix = match config.space_id.as_deref() {
            Some(space) if !space.is_empty() && space != "default" => format!("/s/{space}"),
            _ => String::new(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            space_prefix,
            auth,
            client,
        })
    }

    fn url(&self, path: &str) -> std::result::Result<Url, TransportError> {
        let raw = format!("{}{}{}", self.endpoint, self.space_prefix, path);
        Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let builder = self
            .client
            .request(method, self.url(path)?)
            .header("kbn-xsrf", "true");
        Ok(match &self.auth {
            FleetAuth::Anonymous => builder,
            FleetAuth::ApiKey(key) => builder.header("Authorization", format!("ApiKey {key}")),
            FleetAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        })
    }

    /// Send and decode `{"item": T}`. `Ok(None)` on 404.
    async fn send_item<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context: &'static str,
    ) -> Result<Option<T>> {
        let response = builder.send().await.map_err(TransportError::from)?;
        let status = response.status();
        debug!(status = status.as_u16(), context, "fleet response");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await.map_err(TransportError::from)?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let envelope: Item<T> =
            serde_json::from_str(&body).map_err(|e| PolicyError::decode(context, e))?;
        Ok(Some(envelope.item))
    }

    fn policy_path(id: &str) -> String {
        format!("{PACKAGE_POLICIES_PATH}/{id}")
    }

    pub async fn get_output(&self, id: &str) -> Result<Option<Output>> {
        let builder = self.request(Method::GET, &format!("{OUTPUTS_PATH}/{id}"))?;
        let raw: Option<serde_json::Value> = self.send_item(builder, "fleet output").await?;
        raw.map(Output::decode).transpose()
    }
}

fn missing(context: &str) -> PolicyError {
    TransportError::Status {
        status: StatusCode::NOT_FOUND.as_u16(),
        body: format!("{context} not found"),
    }
    .into()
}

#[async_trait]
impl PolicyApi for FleetClient {
    async fn create_policy(&self, request: &PolicyRequest) -> Result<PolicyResponse> {
        let builder = self
            .request(Method::POST, PACKAGE_POLICIES_PATH)?
            .query(&[("format", "simplified")])
            .json(request);
        self.send_item(builder, "package policy")
            .await?
            .ok_or_else(|| missing("package policy endpoint"))
    }

    async fn get_policy(&self, id: &str) -> Result<Option<PolicyResponse>> {
        let builder = self
            .request(Method::GET, &Self::policy_path(id))?
            .query(&[("format", "simplified")]);
        self.send_item(builder, "package policy").await
    }

    async fn update_policy(&self, id: &str, request: &PolicyRequest) -> Result<PolicyResponse> {
        let builder = self
            .request(Method::PUT, &Self::policy_path(id))?
            .query(&[("format", "simplified")])
            .json(request);
        self.send_item(builder, "package policy")
            .await?
            .ok_or_else(|| missing("package policy"))
    }

    async fn delete_policy(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &Self::policy_path(id))?
            .send()
            .await
            .map_err(TransportError::from)?;
        let status = response.status();

        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = response.text().await.map_err(TransportError::from)?;
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

//! Fleet outputs an integration policy can route to.
//!
//! The `type` discriminator is matched exactly once, when the response is
//! decoded; an unknown output type is a decode error rather than an untyped
//! pass-through.

use crate::error::{PolicyError, Result};
use crate::variables::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_default_monitoring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_yaml: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSsl {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_authorities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchOutput {
    #[serde(flatten)]
    pub common: OutputCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_trusted_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<OutputSsl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogstashOutput {
    #[serde(flatten)]
    pub common: OutputCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<OutputSsl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaOutput {
    #[serde(flatten)]
    pub common: OutputCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Plaintext on requests; Fleet may answer with a secret marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    Elasticsearch(ElasticsearchOutput),
    Logstash(LogstashOutput),
    Kafka(KafkaOutput),
}

impl Output {
    pub fn decode(json: serde_json::Value) -> Result<Self> {
        serde_json::from_value(json).map_err(|e| PolicyError::decode("fleet output", e))
    }

    pub fn common(&self) -> &OutputCommon {
        match self {
            Output::Elasticsearch(o) => &o.common,
            Output::Logstash(o) => &o.common,
            Output::Kafka(o) => &o.common,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Output::Elasticsearch(_) => "elasticsearch",
            Output::Logstash(_) => "logstash",
            Output::Kafka(_) => "kafka",
        }
    }

    /// Secret reference ids held by this output, if Fleet stores any of its
    /// credentials as secrets.
    pub fn secret_refs(&self) -> Vec<String> {
        let ssl_key = |ssl: &Option<OutputSsl>| {
            ssl.as_ref()
                .and_then(|s| s.key.as_ref())
                .and_then(|k| k.as_secret_ref().map(String::from))
        };
        match self {
            Output::Elasticsearch(o) => ssl_key(&o.ssl).into_iter().collect(),
            Output::Logstash(o) => ssl_key(&o.ssl).into_iter().collect(),
            Output::Kafka(o) => o
                .password
                .as_ref()
                .and_then(|p| p.as_secret_ref().map(String::from))
                .into_iter()
                .collect(),
        }
    }
}

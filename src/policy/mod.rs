//! Integration policy wire types, the cached model, and conversion between
//! them.

mod convert;
mod output;
mod types;

pub use convert::{populate_from_response, to_request};
pub use output::{ElasticsearchOutput, KafkaOutput, LogstashOutput, Output, OutputCommon, OutputSsl};
pub use types::*;

//! Variable trees and envelope unwrapping.

pub mod unwrap;
pub mod value;

pub use unwrap::{unwrap_response, unwrap_set, unwrap_value};
pub use value::{plain, set_to_json, Scalar, Value, VariableSet};

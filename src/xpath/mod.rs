//! XPath Function Surface
//!
//! The expression tree and axis machinery live outside the core; what is
//! kept here is the XPath 1.0 value model and the string/boolean
//! functions that operate on values alone, evaluated over stored-node
//! string values. Node-set coercion goes through
//! [`Document::string_value`](crate::dom::document::Document::string_value).

pub mod functions;
pub mod value;

pub use functions::call;
pub use value::{string_value, Value};

mod backend;
mod http;
mod parse;

pub use backend::{InferenceBackend, ModelStatus};
pub use http::HttpBackend;
pub use parse::parse_fields;

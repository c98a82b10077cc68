//! HTTP Request domain types

mod api_request;
mod body;
mod header;
mod method;

pub use api_request::ApiRequest;
pub use body::{FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, RequestBody, RequestBodyKind};
pub use header::{AUTHORIZATION, Header, Headers};
pub use method::HttpMethod;

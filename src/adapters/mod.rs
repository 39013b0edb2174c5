//! Transport adapters

pub mod http_client;

pub use http_client::mock::MockHttpClient;
pub use http_client::{HttpClient, HttpRequest, ReqwestHttpClient, SimpleHttpResponse};

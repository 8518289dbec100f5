mod bearer_auth;
mod refresh_transport_http;
mod time_source_http;

pub use bearer_auth::*;
pub use refresh_transport_http::*;
pub use time_source_http::*;

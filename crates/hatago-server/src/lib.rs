//! The ambient host surface around the core hub: the streamable-HTTP
//! endpoint (`/mcp`, `/sse`, `/health`, `/metrics`) and the downstream
//! stdio listener, both driving [`hatago_hub::HubFacade::handle`].

pub mod http;
pub mod metrics;
pub mod stdio;

pub use http::HttpEndpoint;
pub use metrics::Metrics;
pub use stdio::serve_stdio;

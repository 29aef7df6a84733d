use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::any, Router};

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod errors;
pub mod http;
pub mod limits;
pub mod logging;
pub mod registry;
pub mod server;
pub mod wsdl;
pub mod xsd;

pub use envelope::Fault;
pub use errors::{RegistrationError, ServerError};
pub use registry::{Operation, ServiceDescriptor};
pub use server::{ServerConfig, SoapServer};
pub use xsd::{FieldKind, FieldSchema, Schema};

use dispatch::Dispatcher;
use limits::ConcurrencyLimit;
use server::DocumentCache;

/// Read-only state shared by every request after bind.
#[derive(Clone)]
pub struct ServiceState {
    pub service_path: Arc<str>,
    pub dispatcher: Dispatcher,
    pub document: DocumentCache,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    pub limiter: ConcurrencyLimit,
}

impl ServiceState {
    pub fn new(config: &ServerConfig, dispatcher: Dispatcher, document: DocumentCache) -> Self {
        Self {
            service_path: Arc::<str>::from(config.path()),
            dispatcher,
            document,
            request_timeout: config.request_timeout,
            max_body_bytes: config.max_body_bytes,
            limiter: ConcurrencyLimit::new(config.max_concurrent_requests),
        }
    }
}

pub fn build_app(state: ServiceState) -> Router {
    Router::new()
        .route(
            state.service_path.as_ref(),
            any(http::handlers::service_endpoint),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

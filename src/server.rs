//! Service assembly: registration, bind, and serving
//!
//! A [`SoapServer`] owns the registry while operations are added. `bind`
//! freezes the current state: it installs the advertised address, serializes
//! the protocol document into the shared cache and returns the router for the
//! service path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Bytes, Router};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::errors::{RegistrationError, ServerError};
use crate::registry::{Operation, Registry, ServiceDescriptor};
use crate::wsdl::ProtocolDocument;
use crate::{build_app, ServiceState};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 256;
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub service_name: String,
    /// Host advertised in the target namespace and the service address.
    pub published_host: String,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn new(service_name: impl Into<String>, published_host: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            published_host: published_host.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn target_namespace(&self) -> String {
        format!("http://{}/{}", self.published_host, self.service_name)
    }

    pub fn address(&self, port: u16) -> String {
        format!(
            "http://{}:{}/{}",
            self.published_host, port, self.service_name
        )
    }

    pub fn path(&self) -> String {
        format!("/{}", self.service_name)
    }
}

/// Serialized protocol document shared with every router built by `bind`.
///
/// Readers always observe a complete buffer; a re-bind swaps in a new one.
#[derive(Debug, Clone, Default)]
pub struct DocumentCache {
    bytes: Arc<RwLock<Bytes>>,
}

impl DocumentCache {
    pub fn load(&self) -> Bytes {
        self.bytes.read().clone()
    }

    pub fn store(&self, bytes: Bytes) {
        *self.bytes.write() = bytes;
    }
}

pub struct SoapServer {
    config: ServerConfig,
    registry: Registry,
    cache: DocumentCache,
}

impl SoapServer {
    pub fn new(config: ServerConfig) -> Self {
        let document = ProtocolDocument::new(&config.service_name, &config.target_namespace());
        Self {
            config,
            registry: Registry::new(document),
            cache: DocumentCache::default(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn document_cache(&self) -> DocumentCache {
        self.cache.clone()
    }

    pub fn register<O: Operation>(&mut self, operation: O) -> Result<(), RegistrationError> {
        self.registry
            .register(ServiceDescriptor::from_operation(operation))
    }

    pub fn register_descriptor(
        &mut self,
        descriptor: ServiceDescriptor,
    ) -> Result<(), RegistrationError> {
        self.registry.register(descriptor)
    }

    pub fn register_many<I>(&mut self, descriptors: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = ServiceDescriptor>,
    {
        self.registry.register_many(descriptors)
    }

    /// Serializes the document for `port`, replaces the cache and returns the
    /// router serving `/{service_name}`. Callers must not bind concurrently.
    pub fn bind(&mut self, port: u16) -> Result<Router, ServerError> {
        let location = self.config.address(port);
        let bytes = self.registry.document_mut().bind(location.clone())?;
        self.cache.store(bytes);

        info!(
            service = %self.config.service_name,
            location = %location,
            operations = self.registry.len(),
            "protocol document bound"
        );

        let dispatcher = Dispatcher::new(
            self.config.service_name.as_str(),
            self.registry.operation_table(),
        );
        let state = ServiceState::new(&self.config, dispatcher, self.cache.clone());
        Ok(build_app(state))
    }

    /// Binds a listener on `addr` and serves until the listener fails.
    pub async fn serve(mut self, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let app = self.bind(local_addr.port())?;

        info!(
            bind_addr = %local_addr,
            path = %self.config.path(),
            "server starting"
        );

        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}

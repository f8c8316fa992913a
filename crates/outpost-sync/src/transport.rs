//! Transport abstraction for the sync protocols.
//!
//! A [`Service`] answers requests (the server side of an endpoint); a
//! [`Transport`] delivers a request to a named endpoint and returns the
//! response. Implementations may sit on HTTP or any other request/response
//! channel; [`memory::MemoryNetwork`] routes in-process for tests and
//! embedded deployments.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::{Request, Response};

/// Server side of an endpoint.
#[async_trait]
pub trait Service: Send + Sync {
    /// Answer one request. Failures are expressed as status codes.
    async fn handle(&self, request: Request) -> Response;
}

/// Client side: deliver requests to named endpoints.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` to `endpoint` and wait for its response.
    ///
    /// An `Err` means the request was not answered (unreachable peer,
    /// connection reset). Any answered request is `Ok`, whatever its status.
    async fn call(&self, endpoint: &str, request: Request) -> Result<Response>;
}

#[async_trait]
impl<S: Service + ?Sized> Service for Arc<S> {
    async fn handle(&self, request: Request) -> Response {
        (**self).handle(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(&self, endpoint: &str, request: Request) -> Result<Response> {
        (**self).call(endpoint, request).await
    }
}

/// A simple in-memory transport for testing.
///
/// Services are registered under endpoint names and called directly.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;

    use crate::error::SyncError;

    /// Shared routing table for in-memory endpoints.
    pub struct MemoryNetwork {
        /// Registered services by endpoint name.
        services: RwLock<HashMap<String, Arc<dyn Service>>>,
        /// Endpoints currently unreachable.
        offline: RwLock<HashSet<String>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Expose `service` under `endpoint`, replacing any previous one.
        pub async fn register(&self, endpoint: impl Into<String>, service: Arc<dyn Service>) {
            self.services.write().await.insert(endpoint.into(), service);
        }

        /// Remove an endpoint.
        pub async fn unregister(&self, endpoint: &str) {
            self.services.write().await.remove(endpoint);
        }

        /// Simulate an endpoint dropping off the network (or coming back).
        pub async fn set_online(&self, endpoint: &str, online: bool) {
            let mut offline = self.offline.write().await;
            if online {
                offline.remove(endpoint);
            } else {
                offline.insert(endpoint.to_string());
            }
        }

        /// Create a transport connected to this network.
        pub fn transport(self: &Arc<Self>) -> MemoryTransport {
            MemoryTransport {
                network: Arc::clone(self),
            }
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                services: RwLock::new(HashMap::new()),
                offline: RwLock::new(HashSet::new()),
            }
        }
    }

    /// In-memory transport implementation.
    #[derive(Clone)]
    pub struct MemoryTransport {
        network: Arc<MemoryNetwork>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn call(&self, endpoint: &str, request: Request) -> Result<Response> {
            if self.network.offline.read().await.contains(endpoint) {
                return Err(SyncError::Transport(format!("endpoint offline: {}", endpoint)));
            }
            // Routing lock is released before dispatch.
            let service = self.network.services.read().await.get(endpoint).cloned();
            match service {
                Some(service) => Ok(service.handle(request).await),
                None => Err(SyncError::Transport(format!("endpoint not found: {}", endpoint))),
            }
        }
    }
}

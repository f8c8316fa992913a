//! Request handler for the replication and primary repository endpoints.
//!
//! | path | method | answers |
//! |---|---|---|
//! | `replication/query`, `repository/query` | GET | listing lines for `customer?`/`name?` |
//! | `replication/get`, `repository/checkout` | GET | content of one version, or 404 |
//! | `replication/put` | POST | 200 stored or identical, 409 conflict |
//! | `repository/commit` | POST | 200, or 500 if not master or out of sequence |
//!
//! `get`, `checkout`, `put` and `commit` require `customer`, `name` and
//! `version`; a missing or malformed one is a 400, an unknown repository a
//! 404.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use outpost_core::RepositoryId;
use outpost_store::{PutOutcome, RepositoryStore};
use outpost_sync::messages::{params, to_lines};
use outpost_sync::{Method, Request, Response, Service};

use crate::repository::{Repository, RepositoryListing};

/// Repository paths, relative to the endpoint.
pub mod paths {
    pub const REPLICATION_QUERY: &str = "replication/query";
    pub const REPLICATION_GET: &str = "replication/get";
    pub const REPLICATION_PUT: &str = "replication/put";
    pub const REPOSITORY_QUERY: &str = "repository/query";
    pub const REPOSITORY_CHECKOUT: &str = "repository/checkout";
    pub const REPOSITORY_COMMIT: &str = "repository/commit";
}

/// Serves a set of repository instances.
pub struct RepositoryServer<S: RepositoryStore> {
    repositories: BTreeMap<RepositoryId, Arc<Repository<S>>>,
}

impl<S: RepositoryStore> RepositoryServer<S> {
    /// A server with no repositories.
    pub fn new() -> Self {
        Self {
            repositories: BTreeMap::new(),
        }
    }

    /// Serve `repository`, replacing any instance with the same id.
    pub fn with_repository(mut self, repository: Arc<Repository<S>>) -> Self {
        self.add(repository);
        self
    }

    pub fn add(&mut self, repository: Arc<Repository<S>>) {
        self.repositories.insert(repository.id().clone(), repository);
    }

    pub fn repository(&self, id: &RepositoryId) -> Option<&Arc<Repository<S>>> {
        self.repositories.get(id)
    }

    async fn query(&self, request: &Request) -> Response {
        if request.param(params::FILTER).is_some() {
            return Response::bad_request("filter parameter is not supported");
        }
        let customer = request.param(params::CUSTOMER);
        let name = request.param(params::NAME);

        let mut listings = Vec::new();
        for (id, repository) in &self.repositories {
            if !id.matches(customer, name) {
                continue;
            }
            match repository.versions().await {
                Ok(versions) => listings.push(RepositoryListing {
                    id: id.clone(),
                    versions,
                }),
                Err(e) => return Response::internal_error(e.to_string()),
            }
        }
        Response::ok(to_lines(&listings))
    }

    async fn get(&self, request: &Request) -> Response {
        let (repository, version) = match self.target(request) {
            Ok(target) => target,
            Err(response) => return response,
        };
        match repository.checkout(version).await {
            Ok(Some(content)) => Response::ok(content),
            Ok(None) => {
                tracing::debug!(repo = %repository.id(), version, "version not found");
                Response::not_found(format!("version {} not found", version))
            }
            Err(e) => Response::internal_error(e.to_string()),
        }
    }

    async fn put(&self, request: &Request) -> Response {
        let (repository, version) = match self.target(request) {
            Ok(target) => target,
            Err(response) => return response,
        };
        match repository.put(version, request.body.clone()).await {
            Ok(PutOutcome::Stored) | Ok(PutOutcome::Unchanged) => Response::ok_empty(),
            Ok(PutOutcome::Conflict) => Response::conflict(format!(
                "version {} already exists with different content",
                version
            )),
            Err(e) => Response::internal_error(e.to_string()),
        }
    }

    async fn commit(&self, request: &Request) -> Response {
        let (repository, version) = match self.target(request) {
            Ok(target) => target,
            Err(response) => return response,
        };
        match repository.commit(version, request.body.clone()).await {
            Ok(()) => Response::ok_empty(),
            Err(e) if e.is_sequencing() => Response::internal_error(e.to_string()),
            Err(e) => {
                tracing::warn!(repo = %repository.id(), version, error = %e, "commit failed");
                Response::internal_error(e.to_string())
            }
        }
    }

    /// Resolve `customer`, `name`, `version` to a served repository.
    fn target(&self, request: &Request) -> Result<(&Arc<Repository<S>>, u64), Response> {
        let (customer, name) = match (request.param(params::CUSTOMER), request.param(params::NAME)) {
            (Some(customer), Some(name)) => (customer, name),
            _ => return Err(Response::bad_request("customer and name are required")),
        };
        let version = match request.parse_param::<u64>(params::VERSION) {
            Ok(Some(version)) => version,
            Ok(None) => return Err(Response::bad_request("version is required")),
            Err(message) => return Err(Response::bad_request(message)),
        };

        let id = RepositoryId::new(customer, name);
        match self.repositories.get(&id) {
            Some(repository) => Ok((repository, version)),
            None => Err(Response::not_found(format!("unknown repository: {}", id))),
        }
    }
}

impl<S: RepositoryStore> Default for RepositoryServer<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: RepositoryStore> Service for RepositoryServer<S> {
    async fn handle(&self, request: Request) -> Response {
        let expected = match request.route() {
            paths::REPLICATION_QUERY
            | paths::REPOSITORY_QUERY
            | paths::REPLICATION_GET
            | paths::REPOSITORY_CHECKOUT => Method::Get,
            paths::REPLICATION_PUT | paths::REPOSITORY_COMMIT => Method::Post,
            other => return Response::not_found(format!("unknown path: {}", other)),
        };
        if request.method != expected {
            return Response::method_not_allowed(request.method);
        }

        match request.route() {
            paths::REPLICATION_QUERY | paths::REPOSITORY_QUERY => self.query(&request).await,
            paths::REPLICATION_GET | paths::REPOSITORY_CHECKOUT => self.get(&request).await,
            paths::REPLICATION_PUT => self.put(&request).await,
            _ => self.commit(&request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use outpost_store::MemoryRepositoryStore;
    use outpost_sync::messages::status;

    use crate::repository::RepositoryConfig;

    async fn server(master: bool) -> RepositoryServer<Arc<MemoryRepositoryStore>> {
        let store = Arc::new(MemoryRepositoryStore::new());
        let config = RepositoryConfig {
            master,
            ..RepositoryConfig::master("acme", "shop")
        };
        let repository = Repository::open(config, store).await.unwrap();
        RepositoryServer::new().with_repository(Arc::new(repository))
    }

    fn versioned(path: &str, version: impl ToString, body: &'static [u8]) -> Request {
        let request = if body.is_empty() {
            Request::get(path)
        } else {
            Request::post(path, Bytes::from_static(body))
        };
        request
            .with_param(params::CUSTOMER, "acme")
            .with_param(params::NAME, "shop")
            .with_param(params::VERSION, version)
    }

    #[tokio::test]
    async fn test_commit_sequencing_over_the_wire() {
        let server = server(true).await;

        let commit = |v: u64, body: &'static [u8]| versioned(paths::REPOSITORY_COMMIT, v, body);
        assert_eq!(server.handle(commit(1, b"X")).await.status, status::OK);
        assert_eq!(server.handle(commit(1, b"Y")).await.status, status::INTERNAL_ERROR);
        assert_eq!(server.handle(commit(3, b"Z")).await.status, status::INTERNAL_ERROR);
        assert_eq!(server.handle(commit(2, b"Z")).await.status, status::OK);

        let checkout = server.handle(versioned(paths::REPOSITORY_CHECKOUT, 1, b"")).await;
        assert_eq!(&checkout.body[..], b"X");
    }

    #[tokio::test]
    async fn test_non_master_rejects_commit_accepts_put() {
        let server = server(false).await;

        for version in [1, 2, 5] {
            let response = server
                .handle(versioned(paths::REPOSITORY_COMMIT, version, b"X"))
                .await;
            assert_eq!(response.status, status::INTERNAL_ERROR);
        }

        let put = server.handle(versioned(paths::REPLICATION_PUT, 1, b"X")).await;
        assert_eq!(put.status, status::OK);

        let get = server.handle(versioned(paths::REPLICATION_GET, 1, b"")).await;
        assert_eq!(&get.body[..], b"X");
    }

    #[tokio::test]
    async fn test_put_identical_and_conflicting() {
        let server = server(false).await;
        server.handle(versioned(paths::REPLICATION_PUT, 1, b"X")).await;

        let same = server.handle(versioned(paths::REPLICATION_PUT, 1, b"X")).await;
        assert_eq!(same.status, status::OK);

        let clash = server.handle(versioned(paths::REPLICATION_PUT, 1, b"Y")).await;
        assert_eq!(clash.status, status::CONFLICT);

        let get = server.handle(versioned(paths::REPLICATION_GET, 1, b"")).await;
        assert_eq!(&get.body[..], b"X");
    }

    #[tokio::test]
    async fn test_query_lists_versions() {
        let server = server(true).await;
        server.handle(versioned(paths::REPOSITORY_COMMIT, 1, b"X")).await;
        server.handle(versioned(paths::REPOSITORY_COMMIT, 2, b"Y")).await;

        let response = server.handle(Request::get(paths::REPLICATION_QUERY)).await;
        assert_eq!(response.text().unwrap(), "acme,shop,1-2\n");

        let other = server
            .handle(Request::get(paths::REPOSITORY_QUERY).with_param(params::CUSTOMER, "globex"))
            .await;
        assert_eq!(other.text().unwrap(), "");

        let filtered = server
            .handle(Request::get(paths::REPOSITORY_QUERY).with_param(params::FILTER, "(x=y)"))
            .await;
        assert_eq!(filtered.status, status::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_request_errors() {
        let server = server(true).await;

        let missing_version = Request::get(paths::REPLICATION_GET)
            .with_param(params::CUSTOMER, "acme")
            .with_param(params::NAME, "shop");
        assert_eq!(server.handle(missing_version).await.status, status::BAD_REQUEST);

        let bad_version = versioned(paths::REPLICATION_GET, "latest", b"");
        assert_eq!(server.handle(bad_version).await.status, status::BAD_REQUEST);

        let absent = versioned(paths::REPLICATION_GET, 9, b"");
        assert_eq!(server.handle(absent).await.status, status::NOT_FOUND);

        let unknown = Request::get(paths::REPLICATION_GET)
            .with_param(params::CUSTOMER, "globex")
            .with_param(params::NAME, "shop")
            .with_param(params::VERSION, 1);
        assert_eq!(server.handle(unknown).await.status, status::NOT_FOUND);

        let wrong_method = versioned(paths::REPLICATION_PUT, 1, b"");
        assert_eq!(server.handle(wrong_method).await.status, status::METHOD_NOT_ALLOWED);
    }
}

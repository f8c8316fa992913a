//! Clients for the replication and primary repository endpoints.

use std::time::Duration;

use bytes::Bytes;

use outpost_core::RepositoryId;
use outpost_sync::messages::{params, parse_lines, status};
use outpost_sync::{Request, Response, SyncError, Transport, DEFAULT_REQUEST_TIMEOUT};

use crate::error::{RepoError, Result};
use crate::repository::RepositoryListing;
use crate::server::paths;

/// Shared plumbing: endpoint name plus per-call timeout.
struct Endpoint<T: Transport> {
    transport: T,
    name: String,
    timeout: Duration,
}

impl<T: Transport> Endpoint<T> {
    async fn call(&self, request: Request) -> Result<Response> {
        let path = request.path.clone();
        let response = tokio::time::timeout(self.timeout, self.transport.call(&self.name, request))
            .await
            .map_err(|_| {
                SyncError::Timeout(format!(
                    "{}/{} after {}ms",
                    self.name,
                    path,
                    self.timeout.as_millis()
                ))
            })??;
        Ok(response)
    }

    async fn query(&self, path: &str, customer: Option<&str>, name: Option<&str>) -> Result<Vec<RepositoryListing>> {
        let request = Request::get(path)
            .with_opt_param(params::CUSTOMER, customer)
            .with_opt_param(params::NAME, name);
        let response = self.call(request).await?.error_for_status()?;
        let (listings, rejected) = parse_lines(response.text()?);
        for line in rejected {
            tracing::warn!(record = %line, "skipping malformed repository listing");
        }
        Ok(listings)
    }

    async fn fetch(&self, path: &str, id: &RepositoryId, version: u64) -> Result<Option<Bytes>> {
        let response = self.call(versioned(Request::get(path), id, version)).await?;
        if response.status == status::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.body))
    }
}

fn versioned(request: Request, id: &RepositoryId, version: u64) -> Request {
    request
        .with_param(params::CUSTOMER, &id.customer)
        .with_param(params::NAME, &id.name)
        .with_param(params::VERSION, version)
}

/// Client for `replication/*`.
pub struct ReplicationClient<T: Transport> {
    endpoint: Endpoint<T>,
}

impl<T: Transport> ReplicationClient<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint {
                transport,
                name: endpoint.into(),
                timeout: DEFAULT_REQUEST_TIMEOUT,
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint.name
    }

    /// Listings of the remote repositories matching the filters.
    pub async fn query(&self, customer: Option<&str>, name: Option<&str>) -> Result<Vec<RepositoryListing>> {
        self.endpoint
            .query(paths::REPLICATION_QUERY, customer, name)
            .await
    }

    /// Content of one version; `None` if the remote does not have it.
    pub async fn get(&self, id: &RepositoryId, version: u64) -> Result<Option<Bytes>> {
        self.endpoint.fetch(paths::REPLICATION_GET, id, version).await
    }

    /// Write one version to the remote.
    ///
    /// A remote holding different content for `version` yields
    /// [`RepoError::Conflict`].
    pub async fn put(&self, id: &RepositoryId, version: u64, content: Bytes) -> Result<()> {
        let request = versioned(Request::post(paths::REPLICATION_PUT, content), id, version);
        let response = self.endpoint.call(request).await?;
        if response.status == status::CONFLICT {
            return Err(RepoError::Conflict {
                repo: id.clone(),
                version,
            });
        }
        response.error_for_status()?;
        Ok(())
    }
}

/// Client for `repository/*`, the master's authoritative endpoint.
pub struct PrimaryClient<T: Transport> {
    endpoint: Endpoint<T>,
}

impl<T: Transport> PrimaryClient<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint {
                transport,
                name: endpoint.into(),
                timeout: DEFAULT_REQUEST_TIMEOUT,
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.timeout = timeout;
        self
    }

    pub async fn query(&self, customer: Option<&str>, name: Option<&str>) -> Result<Vec<RepositoryListing>> {
        self.endpoint
            .query(paths::REPOSITORY_QUERY, customer, name)
            .await
    }

    /// Content of one version; `None` if it was never committed.
    pub async fn checkout(&self, id: &RepositoryId, version: u64) -> Result<Option<Bytes>> {
        self.endpoint
            .fetch(paths::REPOSITORY_CHECKOUT, id, version)
            .await
    }

    /// Commit the next version on the master.
    ///
    /// A rejected commit (not master, out of sequence) surfaces as
    /// [`SyncError::BadStatus`] with status 500; do not retry it unchanged.
    pub async fn commit(&self, id: &RepositoryId, version: u64, content: Bytes) -> Result<()> {
        let request = versioned(Request::post(paths::REPOSITORY_COMMIT, content), id, version);
        self.endpoint.call(request).await?.error_for_status()?;
        Ok(())
    }

    /// Commit `content` as `highest + 1` and return the version used.
    pub async fn commit_next(&self, id: &RepositoryId, content: Bytes) -> Result<u64> {
        let listings = self
            .query(Some(id.customer.as_str()), Some(id.name.as_str()))
            .await?;
        let highest = listings
            .iter()
            .find(|l| &l.id == id)
            .and_then(|l| l.versions.high())
            .unwrap_or(0);
        let version = highest
            .checked_add(1)
            .ok_or_else(|| RepoError::VersionsExhausted(id.clone()))?;
        self.commit(id, version, content).await?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use outpost_store::MemoryRepositoryStore;
    use outpost_sync::{MemoryNetwork, MemoryTransport};

    use crate::repository::{Repository, RepositoryConfig};
    use crate::server::RepositoryServer;

    async fn network(master: bool) -> Arc<MemoryNetwork> {
        let config = RepositoryConfig {
            master,
            ..RepositoryConfig::master("acme", "shop")
        };
        let repository = Repository::open(config, MemoryRepositoryStore::new()).await.unwrap();
        let network = MemoryNetwork::new();
        network
            .register("repo", Arc::new(RepositoryServer::new().with_repository(Arc::new(repository))))
            .await;
        network
    }

    fn id() -> RepositoryId {
        RepositoryId::new("acme", "shop")
    }

    #[tokio::test]
    async fn test_primary_commit_and_checkout() {
        let network = network(true).await;
        let primary: PrimaryClient<MemoryTransport> = PrimaryClient::new(network.transport(), "repo");

        assert_eq!(primary.commit_next(&id(), Bytes::from_static(b"a")).await.unwrap(), 1);
        assert_eq!(primary.commit_next(&id(), Bytes::from_static(b"b")).await.unwrap(), 2);

        let err = primary.commit(&id(), 2, Bytes::from_static(b"c")).await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::Sync(SyncError::BadStatus { status: 500, .. })
        ));

        let content = primary.checkout(&id(), 2).await.unwrap().unwrap();
        assert_eq!(&content[..], b"b");
        assert!(primary.checkout(&id(), 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_next_after_top_version() {
        let network = network(true).await;
        ReplicationClient::new(network.transport(), "repo")
            .put(&id(), u64::MAX, Bytes::from_static(b"top"))
            .await
            .unwrap();

        let primary = PrimaryClient::new(network.transport(), "repo");
        let err = primary.commit_next(&id(), Bytes::from_static(b"a")).await.unwrap_err();
        assert!(matches!(err, RepoError::VersionsExhausted(_)));
    }

    #[tokio::test]
    async fn test_replication_put_conflict() {
        let network = network(false).await;
        let client = ReplicationClient::new(network.transport(), "repo");

        client.put(&id(), 1, Bytes::from_static(b"a")).await.unwrap();
        client.put(&id(), 1, Bytes::from_static(b"a")).await.unwrap();
        let err = client.put(&id(), 1, Bytes::from_static(b"b")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict { version: 1, .. }));

        let listings = client.query(Some("acme"), None).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].versions.to_string(), "1");
    }
}

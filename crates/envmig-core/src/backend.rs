//! Management API seam
//!
//! Everything the orchestrator needs from the content backend, scoped to one
//! space. Implementations: `envmig_contentful::ContentfulClient` over HTTP,
//! `envmig_test_utils::InMemoryBackend` for tests.

use crate::error::BackendError;
use crate::types::{
    Alias, ApiKey, Entry, Environment, EnvironmentId, EnvironmentStatus, Locale, Space,
};
use async_trait::async_trait;

/// Space-scoped management operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// The space this client is bound to
    async fn space(&self) -> Result<Space, BackendError>;

    /// Fetch an environment; `BackendError::NotFound` if absent
    async fn environment(&self, id: &EnvironmentId) -> Result<Environment, BackendError>;

    /// Create an environment, cloned from `source` when given
    async fn create_environment(
        &self,
        id: &EnvironmentId,
        name: &str,
        source: Option<EnvironmentId>,
    ) -> Result<Environment, BackendError>;

    /// Delete an environment
    async fn delete_environment(&self, id: &EnvironmentId) -> Result<(), BackendError>;

    /// Current provisioning status of an environment
    async fn environment_status(
        &self,
        id: &EnvironmentId,
    ) -> Result<EnvironmentStatus, BackendError> {
        Ok(self.environment(id).await?.status)
    }

    /// All API keys of the space
    async fn api_keys(&self) -> Result<Vec<ApiKey>, BackendError>;

    /// Persist an API key (name, description, environment links)
    async fn update_api_key(&self, key: &ApiKey) -> Result<ApiKey, BackendError>;

    /// Locales of an environment
    async fn locales(&self, environment: &EnvironmentId) -> Result<Vec<Locale>, BackendError>;

    /// Entries of one content type
    async fn entries(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
    ) -> Result<Vec<Entry>, BackendError>;

    /// Persist entry fields; returns the entry with its new version
    async fn update_entry(
        &self,
        environment: &EnvironmentId,
        entry: &Entry,
    ) -> Result<Entry, BackendError>;

    /// Publish the current entry version
    async fn publish_entry(
        &self,
        environment: &EnvironmentId,
        entry: &Entry,
    ) -> Result<Entry, BackendError>;

    /// Fetch an environment alias
    async fn alias(&self, name: &str) -> Result<Alias, BackendError>;

    /// Persist an alias target
    async fn update_alias(&self, alias: &Alias) -> Result<Alias, BackendError>;
}

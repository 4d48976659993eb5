//! API key linking
//!
//! Grants every existing API key access to the new environment. Updates are
//! issued concurrently and awaited together; one failure fails the call, and
//! updates that already landed stay in place.

use crate::backend::ManagementApi;
use crate::error::BackendError;
use crate::types::EnvironmentId;
use futures::future::try_join_all;
use serde::Serialize;

/// Keys touched by a linking pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    /// Keys that received a new link
    pub updated: Vec<String>,
    /// Keys that already linked the environment
    pub already_linked: Vec<String>,
}

/// Appends environment links to API keys
#[derive(Clone, Copy)]
pub struct ApiKeyLinker<'a> {
    api: &'a dyn ManagementApi,
}

impl<'a> ApiKeyLinker<'a> {
    /// Create linker
    #[inline]
    #[must_use]
    pub fn new(api: &'a dyn ManagementApi) -> Self {
        Self { api }
    }

    /// Link every key of the space to `environment`
    ///
    /// # Errors
    /// The first failed listing or update
    pub async fn link_all(&self, environment: &EnvironmentId) -> Result<LinkSummary, BackendError> {
        let keys = self.api.api_keys().await?;
        let mut summary = LinkSummary::default();

        let mut pending = Vec::with_capacity(keys.len());
        for mut key in keys {
            if key.link(environment) {
                pending.push(key);
            } else {
                tracing::debug!("Key {} already links {}", key.id, environment);
                summary.already_linked.push(key.id);
            }
        }

        let updates = pending.iter().map(|key| {
            tracing::info!("Updating - {}", key.id);
            self.api.update_api_key(key)
        });
        let updated = try_join_all(updates).await?;

        summary.updated = updated.into_iter().map(|key| key.id).collect();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockManagementApi;
    use crate::types::{ApiKey, EnvironmentLink};

    fn key(id: &str, environments: &[&str]) -> ApiKey {
        ApiKey {
            id: id.to_string(),
            name: format!("{id} key"),
            description: None,
            environments: environments.iter().copied().map(EnvironmentLink::environment).collect(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn links_every_key_once() {
        let mut api = MockManagementApi::new();
        api.expect_api_keys().returning(|| {
            Ok(vec![
                key("a", &["master"]),
                key("b", &["master", "GH-x"]),
                key("c", &[]),
            ])
        });
        api.expect_update_api_key()
            .times(2)
            .withf(|k| k.environments.last() == Some(&EnvironmentLink::environment("GH-x")))
            .returning(|k| {
                let mut saved = k.clone();
                saved.version += 1;
                Ok(saved)
            });

        let summary = ApiKeyLinker::new(&api)
            .link_all(&EnvironmentId::new("GH-x"))
            .await
            .unwrap();

        assert_eq!(summary.updated, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(summary.already_linked, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn any_failed_update_fails_the_call() {
        let mut api = MockManagementApi::new();
        api.expect_api_keys()
            .returning(|| Ok(vec![key("a", &[]), key("b", &[])]));
        api.expect_update_api_key().returning(|k| {
            if k.id == "b" {
                Err(BackendError::Status {
                    status: 409,
                    message: "version mismatch".to_string(),
                })
            } else {
                Ok(k.clone())
            }
        });

        let err = ApiKeyLinker::new(&api)
            .link_all(&EnvironmentId::new("GH-x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn no_keys_is_a_no_op() {
        let mut api = MockManagementApi::new();
        api.expect_api_keys().returning(|| Ok(vec![]));
        api.expect_update_api_key().never();

        let summary = ApiKeyLinker::new(&api)
            .link_all(&EnvironmentId::new("GH-x"))
            .await
            .unwrap();
        assert_eq!(summary, LinkSummary::default());
    }
}

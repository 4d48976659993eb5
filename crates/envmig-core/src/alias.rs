//! Alias cutover

use crate::backend::ManagementApi;
use crate::error::BackendError;
use crate::types::{Alias, EnvironmentId};
use serde::Serialize;

/// Result of the cutover stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CutoverOutcome {
    /// Not a primary run
    Skipped,
    /// Alias now points at the new environment
    Switched {
        /// Alias id
        alias: String,
        /// Previous target
        previous: EnvironmentId,
        /// New target
        environment: EnvironmentId,
    },
    /// Cutover failed; the run still succeeded
    Failed {
        /// Alias id
        alias: String,
        /// Failure message
        reason: String,
    },
}

impl CutoverOutcome {
    /// Whether the alias was switched
    #[inline]
    #[must_use]
    pub fn is_switched(&self) -> bool {
        matches!(self, Self::Switched { .. })
    }
}

/// Repoints a named alias
#[derive(Clone, Copy)]
pub struct AliasSwitcher<'a> {
    api: &'a dyn ManagementApi,
}

impl<'a> AliasSwitcher<'a> {
    /// Create switcher
    #[inline]
    #[must_use]
    pub fn new(api: &'a dyn ManagementApi) -> Self {
        Self { api }
    }

    /// Point `alias` at `target`; returns the alias as it was before
    ///
    /// # Errors
    /// The failed fetch or update
    pub async fn switch(&self, alias: &str, target: &EnvironmentId) -> Result<Alias, BackendError> {
        let current = self.api.alias(alias).await?;
        let mut updated = current.clone();
        updated.environment = target.clone();

        let saved = self.api.update_alias(&updated).await?;
        tracing::info!("alias {} updated.", saved.id);
        Ok(current)
    }

    /// Switch, folding failure into the outcome
    pub async fn cut_over(&self, alias: &str, target: &EnvironmentId) -> CutoverOutcome {
        match self.switch(alias, target).await {
            Ok(previous) => CutoverOutcome::Switched {
                alias: alias.to_string(),
                previous: previous.environment,
                environment: target.clone(),
            },
            Err(e) => {
                tracing::error!("Switching alias {} to {} failed: {}", alias, target, e);
                CutoverOutcome::Failed {
                    alias: alias.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockManagementApi;

    #[tokio::test]
    async fn repoints_alias() {
        let mut api = MockManagementApi::new();
        api.expect_alias().returning(|name| {
            Ok(Alias {
                id: name.to_string(),
                environment: EnvironmentId::new("master-2024-01-01-0000"),
                version: 4,
            })
        });
        api.expect_update_alias()
            .withf(|a| a.environment.as_str() == "master-2024-03-05-0907" && a.version == 4)
            .times(1)
            .returning(|a| Ok(a.clone()));

        let outcome = AliasSwitcher::new(&api)
            .cut_over("master", &EnvironmentId::new("master-2024-03-05-0907"))
            .await;

        assert_eq!(
            outcome,
            CutoverOutcome::Switched {
                alias: "master".to_string(),
                previous: EnvironmentId::new("master-2024-01-01-0000"),
                environment: EnvironmentId::new("master-2024-03-05-0907"),
            }
        );
    }

    #[tokio::test]
    async fn failure_is_folded_into_outcome() {
        let mut api = MockManagementApi::new();
        api.expect_alias()
            .returning(|_| Err(BackendError::not_found("environment alias master")));
        api.expect_update_alias().never();

        let outcome = AliasSwitcher::new(&api)
            .cut_over("master", &EnvironmentId::new("master-2024-03-05-0907"))
            .await;

        assert!(matches!(
            outcome,
            CutoverOutcome::Failed { ref reason, .. } if reason.contains("not found")
        ));
        assert!(!outcome.is_switched());
    }
}

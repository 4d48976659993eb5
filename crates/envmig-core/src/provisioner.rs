//! Environment provisioning
//!
//! Produces a ready environment for a target id:
//! 1. Look up an existing environment with that id
//! 2. Delete it, unless the id is the protected primary-alias name
//! 3. Create it (cloned from the source environment) and poll until ready
//! 4. Resolve readiness: `failed` aborts, exhaustion follows the policy

use crate::backend::ManagementApi;
use crate::config::ReadinessPolicy;
use crate::error::ProvisionError;
use crate::poller::{PollOutcome, StatusPoller};
use crate::types::{Environment, EnvironmentId, EnvironmentStatus};
use serde::Serialize;

/// How readiness was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Readiness {
    /// Backend reported `ready`
    Ready,
    /// Attempts ran out and the policy allowed proceeding
    Assumed {
        /// Status checks made
        attempts: u32,
        /// Last status seen
        last: EnvironmentStatus,
    },
}

/// Outcome of provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    /// Environment id
    pub environment: EnvironmentId,
    /// Whether an existing environment was deleted first
    pub replaced: bool,
    /// Whether the environment was created by this run
    pub created: bool,
    /// Readiness resolution
    pub readiness: Readiness,
}

/// Ensures the target environment exists and is ready
#[derive(Clone, Copy)]
pub struct EnvironmentProvisioner<'a> {
    api: &'a dyn ManagementApi,
    poller: StatusPoller,
    policy: ReadinessPolicy,
    protected: &'a str,
    source: Option<&'a EnvironmentId>,
}

impl<'a> EnvironmentProvisioner<'a> {
    /// Create provisioner
    ///
    /// `protected` is the bare primary-alias name; an environment with exactly
    /// that id is reused instead of deleted and recreated.
    #[must_use]
    pub fn new(
        api: &'a dyn ManagementApi,
        poller: StatusPoller,
        policy: ReadinessPolicy,
        protected: &'a str,
    ) -> Self {
        Self {
            api,
            poller,
            policy,
            protected,
            source: None,
        }
    }

    /// Clone new environments from `source`
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: Option<&'a EnvironmentId>) -> Self {
        self.source = source;
        self
    }

    /// Provision `target`
    ///
    /// # Errors
    /// - `ProvisionError::Backend` if creation or polling fails
    /// - `ProvisionError::CreationFailed` if the backend reports `failed`
    /// - `ProvisionError::ReadinessTimeout` on exhaustion under `ReadinessPolicy::Fail`
    /// - `ProvisionError::ProtectedMissing` if the protected environment does not exist
    pub async fn provision(&self, target: &EnvironmentId) -> Result<Provisioned, ProvisionError> {
        // Compared against the bare alias name only; decorated primary ids
        // (`master-2024-03-05-0907`) never match and are always replaced.
        let protected = target.as_str() == self.protected;

        tracing::info!("Checking for existing versions of environment: {}", target);
        let existing = self.lookup(target).await;

        let mut replaced = false;
        if let Some(environment) = &existing {
            if protected {
                tracing::info!("Environment {} is protected, reusing it", environment.id);
            } else {
                replaced = self.delete(&environment.id).await;
            }
        }

        let created = if protected {
            if existing.is_none() {
                return Err(ProvisionError::ProtectedMissing {
                    environment: target.to_string(),
                });
            }
            false
        } else {
            tracing::info!("Creating environment {}", target);
            self.api
                .create_environment(target, target.as_str(), self.source.cloned())
                .await?;
            true
        };

        tracing::info!("Waiting for environment processing...");
        let readiness = self.resolve(target, self.poller.wait(self.api, target).await?)?;

        Ok(Provisioned {
            environment: target.clone(),
            replaced,
            created,
            readiness,
        })
    }

    /// Existing environment, if any; lookup failures count as absent
    async fn lookup(&self, target: &EnvironmentId) -> Option<Environment> {
        match self.api.environment(target).await {
            Ok(environment) => Some(environment),
            Err(e) if e.is_not_found() => {
                tracing::info!("Environment not found");
                None
            }
            Err(e) => {
                tracing::warn!("Environment lookup failed, treating as absent: {}", e);
                None
            }
        }
    }

    /// Delete an existing environment; failures are logged and absorbed
    async fn delete(&self, id: &EnvironmentId) -> bool {
        match self.api.delete_environment(id).await {
            Ok(()) => {
                tracing::info!("Environment deleted");
                true
            }
            Err(e) => {
                tracing::warn!("Deleting environment {} failed: {}", id, e);
                false
            }
        }
    }

    fn resolve(
        &self,
        target: &EnvironmentId,
        outcome: PollOutcome,
    ) -> Result<Readiness, ProvisionError> {
        match outcome {
            PollOutcome::Terminal(EnvironmentStatus::Ready) => {
                tracing::info!("Successfully processed new environment ({})", target);
                Ok(Readiness::Ready)
            }
            PollOutcome::Terminal(_) => {
                tracing::error!("Environment creation failed");
                Err(ProvisionError::CreationFailed {
                    environment: target.to_string(),
                })
            }
            PollOutcome::Exhausted { attempts, last } => match self.policy {
                ReadinessPolicy::Fail => Err(ProvisionError::ReadinessTimeout {
                    environment: target.to_string(),
                    attempts,
                    last,
                }),
                ReadinessPolicy::Proceed => {
                    tracing::warn!(
                        "Environment {} still {} after {} attempts, proceeding as if ready",
                        target,
                        last,
                        attempts
                    );
                    Ok(Readiness::Assumed { attempts, last })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockManagementApi;
    use crate::error::BackendError;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn env(id: &str, status: EnvironmentStatus) -> Environment {
        Environment {
            id: EnvironmentId::new(id),
            name: id.to_string(),
            status,
        }
    }

    fn poller() -> StatusPoller {
        StatusPoller::new(Duration::from_millis(1), 3)
    }

    #[tokio::test]
    async fn replaces_existing_environment() {
        let target = EnvironmentId::new("GH-x");
        let source = EnvironmentId::new("master");
        let mut api = MockManagementApi::new();
        api.expect_environment()
            .returning(|id| Ok(env(id.as_str(), EnvironmentStatus::Ready)));
        api.expect_delete_environment()
            .with(eq(target.clone()))
            .times(1)
            .returning(|_| Ok(()));
        api.expect_create_environment()
            .withf(|id, name, source| {
                id.as_str() == "GH-x"
                    && name == "GH-x"
                    && source.as_ref().map(EnvironmentId::as_str) == Some("master")
            })
            .times(1)
            .returning(|id, _, _| Ok(env(id.as_str(), EnvironmentStatus::Provisioning)));
        api.expect_environment_status()
            .returning(|_| Ok(EnvironmentStatus::Ready));

        let provisioner =
            EnvironmentProvisioner::new(&api, poller(), ReadinessPolicy::Fail, "master")
                .with_source(Some(&source));
        let provisioned = provisioner.provision(&target).await.unwrap();

        assert!(provisioned.replaced);
        assert!(provisioned.created);
        assert_eq!(provisioned.readiness, Readiness::Ready);
    }

    #[tokio::test]
    async fn lookup_failure_means_nothing_to_delete() {
        let mut api = MockManagementApi::new();
        api.expect_environment()
            .returning(|_| Err(BackendError::Status { status: 500, message: "oops".to_string() }));
        api.expect_delete_environment().never();
        api.expect_create_environment()
            .times(1)
            .returning(|id, _, _| Ok(env(id.as_str(), EnvironmentStatus::Provisioning)));
        api.expect_environment_status()
            .returning(|_| Ok(EnvironmentStatus::Ready));

        let provisioner =
            EnvironmentProvisioner::new(&api, poller(), ReadinessPolicy::Fail, "master");
        let provisioned = provisioner.provision(&EnvironmentId::new("GH-x")).await.unwrap();

        assert!(!provisioned.replaced);
        assert!(provisioned.created);
    }

    #[tokio::test]
    async fn failed_status_is_fatal() {
        let mut api = MockManagementApi::new();
        api.expect_environment()
            .returning(|_| Err(BackendError::not_found("environment")));
        api.expect_create_environment()
            .returning(|id, _, _| Ok(env(id.as_str(), EnvironmentStatus::Provisioning)));
        api.expect_environment_status()
            .returning(|_| Ok(EnvironmentStatus::Failed));

        let provisioner =
            EnvironmentProvisioner::new(&api, poller(), ReadinessPolicy::Proceed, "master");
        let err = provisioner.provision(&EnvironmentId::new("GH-x")).await.unwrap_err();

        assert!(matches!(err, ProvisionError::CreationFailed { .. }));
    }

    #[tokio::test]
    async fn exhaustion_follows_policy() {
        for (policy, proceeds) in [
            (ReadinessPolicy::Fail, false),
            (ReadinessPolicy::Proceed, true),
        ] {
            let mut api = MockManagementApi::new();
            api.expect_environment()
                .returning(|_| Err(BackendError::not_found("environment")));
            api.expect_create_environment()
                .returning(|id, _, _| Ok(env(id.as_str(), EnvironmentStatus::Provisioning)));
            api.expect_environment_status()
                .times(3)
                .returning(|_| Ok(EnvironmentStatus::Provisioning));

            let provisioner = EnvironmentProvisioner::new(&api, poller(), policy, "master");
            let result = provisioner.provision(&EnvironmentId::new("GH-x")).await;

            if proceeds {
                assert_eq!(
                    result.unwrap().readiness,
                    Readiness::Assumed {
                        attempts: 3,
                        last: EnvironmentStatus::Provisioning
                    }
                );
            } else {
                assert!(matches!(
                    result.unwrap_err(),
                    ProvisionError::ReadinessTimeout { attempts: 3, .. }
                ));
            }
        }
    }

    #[tokio::test]
    async fn protected_environment_is_reused() {
        let mut api = MockManagementApi::new();
        api.expect_environment()
            .returning(|id| Ok(env(id.as_str(), EnvironmentStatus::Ready)));
        api.expect_delete_environment().never();
        api.expect_create_environment().never();
        api.expect_environment_status()
            .returning(|_| Ok(EnvironmentStatus::Ready));

        let provisioner =
            EnvironmentProvisioner::new(&api, poller(), ReadinessPolicy::Fail, "master");
        let provisioned = provisioner.provision(&EnvironmentId::new("master")).await.unwrap();

        assert!(!provisioned.replaced);
        assert!(!provisioned.created);
    }

    #[tokio::test]
    async fn decorated_primary_id_is_not_protected() {
        let mut api = MockManagementApi::new();
        api.expect_environment()
            .returning(|id| Ok(env(id.as_str(), EnvironmentStatus::Ready)));
        api.expect_delete_environment().times(1).returning(|_| Ok(()));
        api.expect_create_environment()
            .times(1)
            .returning(|id, _, _| Ok(env(id.as_str(), EnvironmentStatus::Provisioning)));
        api.expect_environment_status()
            .returning(|_| Ok(EnvironmentStatus::Ready));

        let provisioner =
            EnvironmentProvisioner::new(&api, poller(), ReadinessPolicy::Fail, "master");
        let provisioned = provisioner
            .provision(&EnvironmentId::new("master-2024-03-05-0907"))
            .await
            .unwrap();

        assert!(provisioned.replaced);
    }

    #[tokio::test]
    async fn protected_but_missing_is_an_error() {
        let mut api = MockManagementApi::new();
        api.expect_environment()
            .returning(|_| Err(BackendError::not_found("environment")));

        let provisioner =
            EnvironmentProvisioner::new(&api, poller(), ReadinessPolicy::Fail, "master");
        let err = provisioner.provision(&EnvironmentId::new("master")).await.unwrap_err();

        assert!(matches!(err, ProvisionError::ProtectedMissing { .. }));
    }
}

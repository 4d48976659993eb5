//! Environment readiness polling

use crate::backend::ManagementApi;
use crate::config::PollingConfig;
use crate::error::BackendError;
use crate::types::{EnvironmentId, EnvironmentStatus};
use std::time::Duration;

/// Result of polling an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Backend reported `ready` or `failed`
    Terminal(EnvironmentStatus),
    /// Attempts ran out before a terminal status
    Exhausted {
        /// Status checks made
        attempts: u32,
        /// Last status seen
        last: EnvironmentStatus,
    },
}

/// Bounded status poller
///
/// Makes at most `max_attempts` status checks, sleeping `interval` between
/// consecutive checks, so it returns within `(max_attempts - 1) * interval`
/// plus request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPoller {
    interval: Duration,
    max_attempts: u32,
}

impl StatusPoller {
    /// Create poller; at least one attempt is always made
    #[inline]
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Poller from configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.interval, config.max_attempts)
    }

    /// Maximum number of status checks
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll until `environment` is terminal or attempts run out
    ///
    /// # Errors
    /// Propagates the first failed status request
    pub async fn wait(
        &self,
        api: &dyn ManagementApi,
        environment: &EnvironmentId,
    ) -> Result<PollOutcome, BackendError> {
        let mut last = EnvironmentStatus::Provisioning;

        for attempt in 1..=self.max_attempts {
            last = api.environment_status(environment).await?;
            tracing::debug!(%environment, attempt, status = %last, "Polled environment status");

            if last.is_terminal() {
                return Ok(PollOutcome::Terminal(last));
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Ok(PollOutcome::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}

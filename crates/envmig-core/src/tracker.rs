//! Version record repository
//!
//! Each environment holds exactly one entry of the version content type. Its
//! version field, under the environment's default locale, names the last
//! migration applied to that environment.

use crate::backend::ManagementApi;
use crate::catalog::MigrationVersion;
use crate::error::VersionError;
use crate::runner::ProgressLog;
use crate::types::{Entry, EnvironmentId};
use async_trait::async_trait;

/// The single version entry of an environment
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    entry: Entry,
    field: String,
    locale: String,
}

impl VersionRecord {
    /// Wrap `entry`, reading `field` under `locale`
    #[must_use]
    pub fn new(entry: Entry, field: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            entry,
            field: field.into(),
            locale: locale.into(),
        }
    }

    /// Underlying entry
    #[inline]
    #[must_use]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Locale the version is read from
    #[inline]
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Stored version string
    ///
    /// # Errors
    /// `VersionError::MissingValue` if the field has no string for the locale
    pub fn version(&self) -> Result<&str, VersionError> {
        self.entry
            .localized_str(&self.field, &self.locale)
            .ok_or_else(|| VersionError::MissingValue {
                entry: self.entry.id.clone(),
                field: self.field.clone(),
                locale: self.locale.clone(),
            })
    }
}

/// Enforce the one-record invariant
///
/// # Errors
/// `VersionError::InvariantViolation` unless `entries` has exactly one element
pub fn single_record(entries: Vec<Entry>, content_type: &str) -> Result<Entry, VersionError> {
    let found = entries.len();
    let mut entries = entries.into_iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(VersionError::InvariantViolation {
            content_type: content_type.to_string(),
            found,
        }),
    }
}

/// Reads and advances the version record of one environment
pub struct VersionTracker<'a> {
    api: &'a dyn ManagementApi,
    environment: EnvironmentId,
    record: VersionRecord,
}

impl std::fmt::Debug for VersionTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionTracker")
            .field("environment", &self.environment)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl<'a> VersionTracker<'a> {
    /// Resolve the default locale and load the version record
    ///
    /// # Errors
    /// - `VersionError::NoDefaultLocale` if no locale is marked default
    /// - `VersionError::InvariantViolation` unless exactly one record exists
    /// - `VersionError::Backend` on request failure
    pub async fn read(
        api: &'a dyn ManagementApi,
        environment: EnvironmentId,
        content_type: &str,
        field: &str,
    ) -> Result<Self, VersionError> {
        let locale = api
            .locales(&environment)
            .await?
            .into_iter()
            .find(|l| l.default)
            .map(|l| l.code)
            .ok_or_else(|| VersionError::NoDefaultLocale {
                environment: environment.to_string(),
            })?;
        tracing::debug!("Default locale of {} is {}", environment, locale);

        let entries = api.entries(&environment, content_type).await?;
        let entry = single_record(entries, content_type)?;

        Ok(Self {
            api,
            environment,
            record: VersionRecord::new(entry, field, locale),
        })
    }

    /// Current record
    #[inline]
    #[must_use]
    pub fn record(&self) -> &VersionRecord {
        &self.record
    }

    /// Stored version string
    ///
    /// # Errors
    /// `VersionError::MissingValue` if the record has no version for the default locale
    pub fn current_version(&self) -> Result<&str, VersionError> {
        self.record.version()
    }

    /// Set, persist and publish a new version
    ///
    /// The in-memory record only changes once the publish succeeded.
    ///
    /// # Errors
    /// `VersionError::Backend` if the update or the publish fails
    pub async fn advance(
        &mut self,
        version: &MigrationVersion,
    ) -> Result<&VersionRecord, VersionError> {
        let mut entry = self.record.entry.clone();
        entry.set_localized(&self.record.field, &self.record.locale, version.as_str());

        let updated = self.api.update_entry(&self.environment, &entry).await?;
        let published = self.api.publish_entry(&self.environment, &updated).await?;

        self.record.entry = published;
        tracing::info!("Updated version entry to {}", version);
        Ok(&self.record)
    }
}

#[async_trait]
impl ProgressLog for VersionTracker<'_> {
    async fn commit(&mut self, version: &MigrationVersion) -> Result<(), VersionError> {
        self.advance(version).await.map(|_| ())
    }
}

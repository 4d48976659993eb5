//! Core types for envmig
//!
//! Backend resources as the orchestrator sees them:
//! - Environments and their provisioning status
//! - API keys and their environment links
//! - Locales, entries and aliases
//!
//! Plus the run classification derived from the source-control ref.

use crate::config::NamingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Environment identifier within a space
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    /// Wrap an identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EnvironmentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EnvironmentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for EnvironmentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Provisioning status reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// Still being copied/created
    Provisioning,
    /// Usable
    Ready,
    /// Creation failed
    Failed,
}

impl EnvironmentStatus {
    /// Map a backend status id; anything unrecognised is still provisioning
    #[must_use]
    pub fn from_status_id(id: &str) -> Self {
        match id {
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            _ => Self::Provisioning,
        }
    }

    /// Whether polling can stop
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Failed => "failed",
        })
    }
}

/// Backend space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Space id
    pub id: String,
    /// Display name
    pub name: String,
}

/// Environment within a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment id
    pub id: EnvironmentId,
    /// Display name
    pub name: String,
    /// Provisioning status
    pub status: EnvironmentStatus,
}

/// Kind of target an API key link points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// A concrete environment
    Environment,
    /// An environment alias, which follows cutovers
    EnvironmentAlias,
    /// Any other link type, kept verbatim
    Other(String),
}

impl LinkKind {
    /// Map a backend `linkType`
    #[must_use]
    pub fn from_link_type(link_type: &str) -> Self {
        match link_type {
            "Environment" => Self::Environment,
            "EnvironmentAlias" => Self::EnvironmentAlias,
            other => Self::Other(other.to_string()),
        }
    }

    /// Backend `linkType`
    #[must_use]
    pub fn link_type(&self) -> &str {
        match self {
            Self::Environment => "Environment",
            Self::EnvironmentAlias => "EnvironmentAlias",
            Self::Other(other) => other,
        }
    }
}

/// Link from an API key to an environment or alias
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentLink {
    /// Target id
    pub id: EnvironmentId,
    /// Target kind
    pub kind: LinkKind,
}

impl EnvironmentLink {
    /// Link to a concrete environment
    #[must_use]
    pub fn environment(id: impl Into<EnvironmentId>) -> Self {
        Self {
            id: id.into(),
            kind: LinkKind::Environment,
        }
    }

    /// Link to an alias
    #[must_use]
    pub fn alias(id: impl Into<EnvironmentId>) -> Self {
        Self {
            id: id.into(),
            kind: LinkKind::EnvironmentAlias,
        }
    }
}

/// Access credential with its environment links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key id
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional description, preserved on update
    pub description: Option<String>,
    /// Environments and aliases this key can read; only ever appended to
    pub environments: Vec<EnvironmentLink>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl ApiKey {
    /// Whether this key already links the concrete environment
    ///
    /// An alias with the same id does not count.
    #[inline]
    #[must_use]
    pub fn links(&self, environment: &EnvironmentId) -> bool {
        self.environments
            .iter()
            .any(|l| l.kind == LinkKind::Environment && l.id == *environment)
    }

    /// Append an environment link; returns false if it was already present
    pub fn link(&mut self, environment: &EnvironmentId) -> bool {
        if self.links(environment) {
            return false;
        }
        self.environments.push(EnvironmentLink::environment(environment.clone()));
        true
    }
}

/// Locale of an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Locale code, e.g. `en-US`
    pub code: String,
    /// Whether this is the default locale
    pub default: bool,
}

/// Content entry with localized fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry id
    pub id: String,
    /// Content type id
    pub content_type: String,
    /// Optimistic concurrency version
    pub version: u64,
    /// `field -> locale -> value`
    pub fields: Map<String, Value>,
}

impl Entry {
    /// Create an entry with no fields
    #[must_use]
    pub fn new(id: impl Into<String>, content_type: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            version,
            fields: Map::new(),
        }
    }

    /// String value of `field` under `locale`
    #[must_use]
    pub fn localized_str(&self, field: &str, locale: &str) -> Option<&str> {
        self.fields.get(field)?.get(locale)?.as_str()
    }

    /// Set `field` under `locale`, keeping other locales
    pub fn set_localized(&mut self, field: &str, locale: &str, value: impl Into<Value>) {
        let slot = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(locales) = slot {
            locales.insert(locale.to_string(), value.into());
        }
    }
}

/// Named pointer to an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Alias id (its name)
    pub id: String,
    /// Environment it points to
    pub environment: EnvironmentId,
    /// Optimistic concurrency version
    pub version: u64,
}

/// Classification of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Trunk run, eligible for alias cutover
    Primary,
    /// Any other branch
    Feature,
}

impl RunKind {
    /// Whether the alias is switched at the end of the run
    #[inline]
    #[must_use]
    pub fn is_primary(self) -> bool {
        matches!(self, Self::Primary)
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Feature => "feature",
        })
    }
}

/// Environment a run targets, derived from the branch name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunTarget {
    /// Branch (last segment of the ref)
    pub branch: String,
    /// Run classification
    pub kind: RunKind,
    /// Environment to provision and migrate
    pub environment: EnvironmentId,
}

impl RunTarget {
    /// Resolve the target for `branch` at time `now`
    ///
    /// The primary branch gets a fresh timestamped environment
    /// (`master-2024-03-05-0907`); other branches get a stable prefixed one
    /// (`GH-feature-x`).
    #[must_use]
    pub fn resolve(naming: &NamingConfig, branch: &str, now: DateTime<Utc>) -> Self {
        if branch == naming.primary_branch {
            let id = format!("{}-{}", naming.primary_branch, now.format("%Y-%m-%d-%H%M"));
            Self {
                branch: branch.to_string(),
                kind: RunKind::Primary,
                environment: EnvironmentId::new(id),
            }
        } else {
            Self {
                branch: branch.to_string(),
                kind: RunKind::Feature,
                environment: EnvironmentId::new(format!("{}{}", naming.feature_prefix, branch)),
            }
        }
    }
}

/// Last path segment of a source-control ref
#[must_use]
pub fn branch_of_ref(git_ref: &str) -> &str {
    git_ref.rsplit('/').next().unwrap_or(git_ref)
}

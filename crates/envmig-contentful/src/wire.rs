//! Management API wire format
//!
//! Resources carry their identity and version in a `sys` block; references
//! between resources are `Link` objects. DTO fields mirror the JSON.

#![allow(missing_docs)]

use envmig_core::{
    Alias, ApiKey, Entry, Environment, EnvironmentId, EnvironmentLink, EnvironmentStatus, LinkKind,
    Locale, Space,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to another resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link target
    pub sys: LinkSys,
}

/// `sys` block of a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSys {
    /// Always `Link` when serialized
    #[serde(rename = "type", default = "link_type")]
    pub kind: String,
    /// Kind of the target (`Environment`, `Status`, `ContentType`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    /// Target id
    pub id: String,
}

fn link_type() -> String {
    "Link".to_string()
}

impl Link {
    /// Link to an environment
    #[must_use]
    pub fn environment(id: &EnvironmentId) -> Self {
        Self::to(&LinkKind::Environment, id)
    }

    /// Link to a target of the given kind
    #[must_use]
    pub fn to(kind: &LinkKind, id: &EnvironmentId) -> Self {
        Self {
            sys: LinkSys {
                kind: link_type(),
                link_type: Some(kind.link_type().to_string()),
                id: id.to_string(),
            },
        }
    }

    /// Target id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.sys.id
    }
}

/// Common `sys` block of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sys {
    /// Resource id
    pub id: String,
    /// Optimistic concurrency version
    #[serde(default)]
    pub version: u64,
    /// Processing status (environments only)
    #[serde(default)]
    pub status: Option<Link>,
    /// Content type (entries only)
    #[serde(default)]
    pub content_type: Option<Link>,
}

/// Page of a collection response
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total items across pages
    #[serde(default)]
    pub total: usize,
}

/// Error response body
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceDto {
    pub sys: Sys,
    pub name: String,
}

impl From<SpaceDto> for Space {
    fn from(dto: SpaceDto) -> Self {
        Self {
            id: dto.sys.id,
            name: dto.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentDto {
    pub sys: Sys,
    pub name: String,
}

impl From<EnvironmentDto> for Environment {
    fn from(dto: EnvironmentDto) -> Self {
        let status = dto
            .sys
            .status
            .as_ref()
            .map_or(EnvironmentStatus::Provisioning, |s| EnvironmentStatus::from_status_id(s.id()));
        Self {
            id: EnvironmentId::new(dto.sys.id),
            name: dto.name,
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentBody<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyDto {
    pub sys: Sys,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub environments: Vec<Link>,
}

impl From<ApiKeyDto> for ApiKey {
    fn from(dto: ApiKeyDto) -> Self {
        Self {
            id: dto.sys.id,
            name: dto.name,
            description: dto.description,
            environments: dto.environments.iter().map(EnvironmentLink::from).collect(),
            version: dto.sys.version,
        }
    }
}

impl From<&Link> for EnvironmentLink {
    /// Untyped links on an API key are environment links
    fn from(link: &Link) -> Self {
        Self {
            id: EnvironmentId::new(link.id()),
            kind: link
                .sys
                .link_type
                .as_deref()
                .map_or(LinkKind::Environment, LinkKind::from_link_type),
        }
    }
}

/// Writable part of an API key
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub environments: Vec<Link>,
}

impl<'a> From<&'a ApiKey> for ApiKeyBody<'a> {
    fn from(key: &'a ApiKey) -> Self {
        Self {
            name: &key.name,
            description: key.description.as_deref(),
            environments: key
                .environments
                .iter()
                .map(|link| Link::to(&link.kind, &link.id))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocaleDto {
    pub code: String,
    #[serde(default)]
    pub default: bool,
}

impl From<LocaleDto> for Locale {
    fn from(dto: LocaleDto) -> Self {
        Self {
            code: dto.code,
            default: dto.default,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryDto {
    pub sys: Sys,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl From<EntryDto> for Entry {
    fn from(dto: EntryDto) -> Self {
        let content_type = dto
            .sys
            .content_type
            .as_ref()
            .map(|link| link.id().to_string())
            .unwrap_or_default();
        Self {
            id: dto.sys.id,
            content_type,
            version: dto.sys.version,
            fields: dto.fields,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryBody<'a> {
    pub fields: &'a Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasDto {
    pub sys: Sys,
    pub environment: Link,
}

impl From<AliasDto> for Alias {
    fn from(dto: AliasDto) -> Self {
        Self {
            id: dto.sys.id,
            environment: EnvironmentId::new(dto.environment.id()),
            version: dto.sys.version,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasBody {
    pub environment: Link,
}

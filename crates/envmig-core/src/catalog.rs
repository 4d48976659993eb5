//! Migration discovery
//!
//! The catalog is the ordered universe of migrations a space passes through.
//! Order comes from the parsed numeric version, never from directory listing
//! order: `1.10.0` sorts after `1.9.0`.

use crate::codec;
use crate::error::{CatalogError, CodecError};
use serde::Serialize;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Dotted numeric version of a migration
///
/// Equality and ordering use the numeric segments; the original text is kept
/// for display and file names.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "String")]
pub struct MigrationVersion {
    segments: Vec<u64>,
    text: String,
}

impl MigrationVersion {
    /// Numeric segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Version as written
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// File name of the migration implementing this version
    #[must_use]
    pub fn file_name(&self) -> String {
        // text was validated on parse
        self.text.replace('.', "_") + codec::MIGRATION_SUFFIX
    }
}

impl FromStr for MigrationVersion {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // validates the shape before parsing segments
        codec::to_file(s)?;
        let segments = s
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CodecError::InvalidVersion(s.to_string()))?;
        Ok(Self {
            segments,
            text: s.to_string(),
        })
    }
}

impl From<MigrationVersion> for String {
    fn from(version: MigrationVersion) -> Self {
        version.text
    }
}

impl std::fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for MigrationVersion {}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments.cmp(&other.segments)
    }
}

/// A single discovered migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationDescriptor {
    /// Version this migration brings the space to
    pub version: MigrationVersion,
    /// Migration file
    pub path: PathBuf,
}

/// Ordered set of migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationCatalog {
    migrations: Vec<MigrationDescriptor>,
}

impl MigrationCatalog {
    /// Discover migrations in `dir`
    ///
    /// Files not named `<digits>(_<digits>)*.js` are ignored.
    ///
    /// # Errors
    /// - `CatalogError::Io` if the directory cannot be read
    /// - `CatalogError::Duplicate` if two files decode to the same version
    pub async fn discover(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let io_err = |source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut reader = tokio::fs::read_dir(dir).await.map_err(io_err)?;
        let mut files = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(io_err)? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !codec::is_migration_file(&name) {
                tracing::debug!("Ignoring {} in migrations directory", name);
                continue;
            }
            if !entry.file_type().await.map_err(io_err)?.is_file() {
                continue;
            }
            files.push(name);
        }

        let catalog = Self::from_files(dir, files)?;
        tracing::debug!("Discovered {} migrations in {}", catalog.len(), dir.display());
        Ok(catalog)
    }

    /// Build from file names relative to `dir`, in any order
    ///
    /// # Errors
    /// - `CatalogError::Codec` if a name is not a migration file name
    /// - `CatalogError::Duplicate` if two names decode to the same version
    pub fn from_files<I, S>(dir: &Path, files: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut migrations = files
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                let version = codec::to_version(name)?.parse::<MigrationVersion>()?;
                Ok(MigrationDescriptor {
                    version,
                    path: dir.join(name),
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        migrations.sort_by(|a, b| a.version.cmp(&b.version));

        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(CatalogError::Duplicate {
                version: pair[0].version.to_string(),
                first: file_name_of(&pair[0].path),
                second: file_name_of(&pair[1].path),
            });
        }

        Ok(Self { migrations })
    }

    /// Position of `version` in the catalog
    #[must_use]
    pub fn position(&self, version: &MigrationVersion) -> Option<usize> {
        self.migrations
            .binary_search_by(|m| m.version.cmp(version))
            .ok()
    }

    /// All migrations in order
    #[inline]
    #[must_use]
    pub fn migrations(&self) -> &[MigrationDescriptor] {
        &self.migrations
    }

    /// Versions in order
    pub fn versions(&self) -> impl Iterator<Item = &MigrationVersion> {
        self.migrations.iter().map(|m| &m.version)
    }

    /// Number of migrations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether no migrations were found
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

//! Migration file name <-> version string
//!
//! `1_2_0.js` <-> `1.2.0`. Only digit groups are accepted in either
//! direction, which is what makes the round trip total.

use crate::error::CodecError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Suffix of every migration file
pub const MIGRATION_SUFFIX: &str = ".js";

static FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(_[0-9]+)*\.js$").expect("static regex"));
static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)*$").expect("static regex"));

/// Whether `name` follows the migration file naming scheme
#[inline]
#[must_use]
pub fn is_migration_file(name: &str) -> bool {
    FILE_NAME.is_match(name)
}

/// Version string of a migration file name
///
/// # Errors
/// `CodecError::InvalidFileName` unless `file` is `<digits>(_<digits>)*.js`
pub fn to_version(file: &str) -> Result<String, CodecError> {
    if !is_migration_file(file) {
        return Err(CodecError::InvalidFileName(file.to_string()));
    }
    let stem = &file[..file.len() - MIGRATION_SUFFIX.len()];
    Ok(stem.replace('_', "."))
}

/// Migration file name of a version string
///
/// # Errors
/// `CodecError::InvalidVersion` unless `version` is `<digits>(.<digits>)*`
pub fn to_file(version: &str) -> Result<String, CodecError> {
    if !VERSION.is_match(version) {
        return Err(CodecError::InvalidVersion(version.to_string()));
    }
    Ok(format!("{}{MIGRATION_SUFFIX}", version.replace('.', "_")))
}

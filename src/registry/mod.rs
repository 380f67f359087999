//! Modrinth registry integration

mod client;

pub use client::ModrinthClient;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::RegistryError;

/// One project hit from text search
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub project_id: String,
    pub title: String,
    pub author: String,
}

/// One downloadable artifact of a version; the first file listed for a
/// version is the canonical one.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionFile {
    pub url: String,
    pub filename: String,
}

/// One publishable release of a project as reported by the registry
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryVersion {
    pub id: String,
    pub project_id: String,
    pub version_number: String,
    /// "release", "beta", or "alpha"
    pub version_type: String,
    #[serde(default)]
    pub loaders: Vec<String>,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub files: Vec<VersionFile>,
}

impl RegistryVersion {
    /// The canonical artifact, if the version has any files at all.
    pub fn primary_file(&self) -> Option<&VersionFile> {
        self.files.first()
    }
}

/// Loader/game-version restriction applied to version listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFilter {
    pub loader: String,
    pub game_version: String,
}

/// Read-only view of the remote registry.
///
/// All operations are stateless request/response; implementations must not
/// panic on network or decode failures. The trait exists so the reconciler,
/// resolver, and sweeper can run against a mock in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// Text search restricted to mods for the given loader and game version,
    /// in registry relevance order.
    async fn search(
        &self,
        query: &str,
        loader: &str,
        game_version: &str,
        limit: u32,
    ) -> Result<Vec<SearchHit>, RegistryError>;

    /// Versions of a project, registry-ordered (newest first). `filter`
    /// restricts by loader and game version; `None` lists everything ever
    /// published.
    async fn versions_for_project(
        &self,
        project_id: &str,
        filter: Option<VersionFilter>,
    ) -> Result<Vec<RegistryVersion>, RegistryError>;

    /// Batch reverse lookup by SHA-1. Unmatched hashes are absent from the
    /// result, not an error.
    async fn resolve_by_hashes(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, RegistryVersion>, RegistryError>;

    /// Batch display-title fetch for a set of project IDs.
    async fn project_titles(
        &self,
        project_ids: &[String],
    ) -> Result<HashMap<String, String>, RegistryError>;

    /// Release-type game versions, newest first as the registry lists them.
    async fn game_versions(&self) -> Result<Vec<String>, RegistryError>;

    /// Loader names that support the "mod" project type, sorted.
    async fn loaders(&self) -> Result<Vec<String>, RegistryError>;
}

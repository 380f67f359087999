//! Modrinth v2 REST API client

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{Registry, RegistryVersion, SearchHit, VersionFilter};
use crate::error::RegistryError;

const API_BASE: &str = "https://api.modrinth.com/v2";
const USER_AGENT: &str = concat!("modrover/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stateless Modrinth client
#[derive(Clone)]
pub struct ModrinthClient {
    client: Arc<reqwest::Client>,
    base_url: String,
}

impl ModrinthClient {
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_base_url(API_BASE)
    }

    /// Client against an alternate base URL (used by tests against a local
    /// server; the production base is `API_BASE`).
    pub fn with_base_url(base_url: &str) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Issue a GET and decode the JSON body, mapping non-2xx to a typed
    /// status error.
    async fn get_json<T>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, RegistryError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status,
                endpoint: endpoint.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Deserialize)]
struct GameVersionTag {
    version: String,
    version_type: String,
}

#[derive(Deserialize)]
struct LoaderTag {
    name: String,
    #[serde(default)]
    supported_project_types: Vec<String>,
}

/// Facet groups AND together; values within a group OR.
fn search_facets(loader: &str, game_version: &str) -> String {
    format!(
        r#"[["project_type:mod"],["categories:{}"],["versions:{}"]]"#,
        loader.to_lowercase(),
        game_version
    )
}

/// The game-version tag list mixes snapshots and betas in; only full
/// releases are offered.
fn release_versions(tags: Vec<GameVersionTag>) -> Vec<String> {
    tags.into_iter()
        .filter(|t| t.version_type == "release")
        .map(|t| t.version)
        .collect()
}

/// Loaders that can host mods (as opposed to plugins or shaders), sorted by
/// name.
fn mod_loaders(tags: Vec<LoaderTag>) -> Vec<String> {
    let mut names: Vec<String> = tags
        .into_iter()
        .filter(|t| t.supported_project_types.iter().any(|p| p == "mod"))
        .map(|t| t.name)
        .collect();
    names.sort();
    names
}

#[async_trait]
impl Registry for ModrinthClient {
    async fn search(
        &self,
        query: &str,
        loader: &str,
        game_version: &str,
        limit: u32,
    ) -> Result<Vec<SearchHit>, RegistryError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            hits: Vec<SearchHit>,
        }

        let facets = search_facets(loader, game_version);

        let response: SearchResponse = self
            .get_json(
                "/search",
                &[
                    ("query", query.to_string()),
                    ("limit", limit.to_string()),
                    ("facets", facets),
                ],
            )
            .await?;

        Ok(response.hits)
    }

    async fn versions_for_project(
        &self,
        project_id: &str,
        filter: Option<VersionFilter>,
    ) -> Result<Vec<RegistryVersion>, RegistryError> {
        let endpoint = format!("/project/{}/version", project_id);

        let mut query = Vec::new();
        if let Some(filter) = filter {
            query.push((
                "loaders",
                format!(r#"["{}"]"#, filter.loader.to_lowercase()),
            ));
            query.push(("game_versions", format!(r#"["{}"]"#, filter.game_version)));
        }

        self.get_json(&endpoint, &query).await
    }

    async fn resolve_by_hashes(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, RegistryVersion>, RegistryError> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/version_files", self.base_url);
        let body = serde_json::json!({
            "hashes": hashes,
            "algorithm": "sha1",
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status,
                endpoint: "/version_files".to_string(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn project_titles(
        &self,
        project_ids: &[String],
    ) -> Result<HashMap<String, String>, RegistryError> {
        #[derive(Deserialize)]
        struct ProjectInfo {
            id: String,
            title: String,
        }

        if project_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = serde_json::to_string(project_ids)?;
        let projects: Vec<ProjectInfo> = self
            .get_json("/projects", &[("ids", ids)])
            .await?;

        Ok(projects.into_iter().map(|p| (p.id, p.title)).collect())
    }

    async fn game_versions(&self) -> Result<Vec<String>, RegistryError> {
        let tags: Vec<GameVersionTag> = self.get_json("/tag/game_version", &[]).await?;
        Ok(release_versions(tags))
    }

    async fn loaders(&self) -> Result<Vec<String>, RegistryError> {
        let tags: Vec<LoaderTag> = self.get_json("/tag/loader", &[]).await?;
        Ok(mod_loaders(tags))
    }
}

//! Search resolver: ranked registry search with version resolution
//!
//! Candidates come back in registry relevance order, get re-ranked so exact
//! title matches lead and prefix matches follow, then a bounded worker pool
//! resolves each candidate to its best downloadable version. Records are
//! emitted as resolution completes, which does not necessarily match the
//! ranked order; callers wanting rank order must re-sort.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::error::RegistryError;
use crate::reconcile::{ModRecord, ModStatus};
use crate::registry::{Registry, RegistryVersion, SearchHit, VersionFilter};
use crate::WORKER_THREADS;

/// How many candidates to request from the registry
const CANDIDATE_LIMIT: u32 = 20;
/// How many ranked candidates to resolve and display
const DISPLAY_LIMIT: usize = 15;

/// Loader and game-version context for a search
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub loader: String,
    pub game_version: String,
}

/// Emission from an in-flight search
#[derive(Debug)]
pub enum SearchEvent {
    Record(ModRecord),
    /// Terminal; `success` is false only when the initial search call
    /// itself failed
    Complete { success: bool },
}

/// Start a search and return the event stream.
pub fn search_mods(
    registry: Arc<dyn Registry>,
    query: String,
    options: SearchOptions,
) -> mpsc::Receiver<SearchEvent> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        run_search(registry, query, options, tx).await;
    });

    rx
}

async fn run_search(
    registry: Arc<dyn Registry>,
    query: String,
    options: SearchOptions,
    tx: mpsc::Sender<SearchEvent>,
) {
    let hits = match registry
        .search(&query, &options.loader, &options.game_version, CANDIDATE_LIMIT)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!("Search failed: {}", e);
            let _ = tx.send(SearchEvent::Complete { success: false }).await;
            return;
        }
    };

    let ranked = rank_hits(hits, &query);

    let semaphore = Arc::new(Semaphore::new(WORKER_THREADS));
    let mut handles = Vec::new();

    for hit in ranked {
        let registry = Arc::clone(&registry);
        let semaphore = Arc::clone(&semaphore);
        let options = options.clone();
        let tx = tx.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.unwrap();
            if let Some(record) = resolve_candidate(&*registry, hit, &options).await {
                let _ = tx.send(SearchEvent::Record(record)).await;
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Search worker panicked: {}", e);
        }
    }

    let _ = tx.send(SearchEvent::Complete { success: true }).await;
}

/// Search and resolve the single best candidate: the highest-ranked hit that
/// resolves to a downloadable version. Resolution still fans out, but results
/// are gathered and chosen by rank, so a slow top candidate is not displaced
/// by a faster lower-ranked one.
pub async fn find_best(
    registry: Arc<dyn Registry>,
    query: &str,
    options: SearchOptions,
) -> Result<Option<ModRecord>, RegistryError> {
    let hits = registry
        .search(query, &options.loader, &options.game_version, CANDIDATE_LIMIT)
        .await?;

    let ranked = rank_hits(hits, query);

    let semaphore = Arc::new(Semaphore::new(WORKER_THREADS));
    let mut handles = Vec::new();

    for (rank, hit) in ranked.into_iter().enumerate() {
        let registry = Arc::clone(&registry);
        let semaphore = Arc::clone(&semaphore);
        let options = options.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.unwrap();
            resolve_candidate(&*registry, hit, &options)
                .await
                .map(|record| (rank, record))
        }));
    }

    let mut best: Option<(usize, ModRecord)> = None;
    for handle in handles {
        match handle.await {
            Ok(Some((rank, record))) => {
                if best.as_ref().map_or(true, |(r, _)| rank < *r) {
                    best = Some((rank, record));
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Search worker panicked: {}", e),
        }
    }

    Ok(best.map(|(_, record)| record))
}

/// Order candidates: exact case-insensitive title match, then prefix match,
/// then the rest, each bucket keeping the registry's relative order. The
/// ranked list is truncated to the display limit.
fn rank_hits(hits: Vec<SearchHit>, query: &str) -> Vec<SearchHit> {
    let query = query.to_lowercase();
    let mut exact = Vec::new();
    let mut prefix = Vec::new();
    let mut rest = Vec::new();

    for hit in hits {
        let title = hit.title.to_lowercase();
        if title == query {
            exact.push(hit);
        } else if title.starts_with(&query) {
            prefix.push(hit);
        } else {
            rest.push(hit);
        }
    }

    exact.extend(prefix);
    exact.extend(rest);
    exact.truncate(DISPLAY_LIMIT);
    exact
}

/// Resolve one candidate to a record, or drop it when no version matches
/// the loader/game-version context.
async fn resolve_candidate(
    registry: &dyn Registry,
    hit: SearchHit,
    options: &SearchOptions,
) -> Option<ModRecord> {
    let filter = VersionFilter {
        loader: options.loader.clone(),
        game_version: options.game_version.clone(),
    };

    let versions = match registry
        .versions_for_project(&hit.project_id, Some(filter))
        .await
    {
        Ok(versions) => versions,
        Err(e) => {
            tracing::debug!("Version lookup failed for {}: {}", hit.project_id, e);
            return None;
        }
    };

    let version = pick_version(&versions)?;
    let file = version.primary_file()?;

    Some(ModRecord {
        title: hit.title,
        author: hit.author,
        version: version.version_number.clone(),
        status: ModStatus::Available,
        download_url: Some(file.url.clone()),
        download_filename: Some(file.filename.clone()),
        needs_update: false,
        project_id: Some(hit.project_id),
        original_filename: None,
    })
}

/// Version preference: first release, else first beta, else whatever the
/// registry listed first.
fn pick_version(versions: &[RegistryVersion]) -> Option<&RegistryVersion> {
    versions
        .iter()
        .find(|v| v.version_type == "release")
        .or_else(|| versions.iter().find(|v| v.version_type == "beta"))
        .or_else(|| versions.first())
}

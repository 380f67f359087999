//! Local-mod reconciliation against the registry
//!
//! A scan lists mod archives in a folder, fingerprints them, batch-resolves
//! the fingerprints, then fans out per-file version checks over a bounded
//! worker pool. Records are emitted in completion order, not directory
//! order, followed by a terminal `Complete`.

mod record;

pub use record::{ModRecord, ModStatus, ScanEvent, ScanOptions};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::fingerprint;
use crate::registry::{Registry, RegistryVersion, VersionFilter};
use crate::WORKER_THREADS;

/// File extension recognized as a mod archive
pub const MOD_EXTENSION: &str = "jar";

/// Start a scan of `folder` and return the event stream.
///
/// An empty or nonexistent folder completes immediately with zero records.
pub fn scan(
    registry: Arc<dyn Registry>,
    folder: PathBuf,
    options: ScanOptions,
) -> mpsc::Receiver<ScanEvent> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        run_scan(registry, folder, options, tx).await;
    });

    rx
}

async fn run_scan(
    registry: Arc<dyn Registry>,
    folder: PathBuf,
    options: ScanOptions,
    tx: mpsc::Sender<ScanEvent>,
) {
    let hash_to_file = {
        let folder = folder.clone();
        tokio::task::spawn_blocking(move || hash_folder(&folder))
            .await
            .unwrap_or_default()
    };

    if hash_to_file.is_empty() {
        let _ = tx.send(ScanEvent::Complete).await;
        return;
    }

    let hashes: Vec<String> = hash_to_file.keys().cloned().collect();
    let recognized = match registry.resolve_by_hashes(&hashes).await {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!("Hash lookup failed, treating all files as unrecognized: {}", e);
            HashMap::new()
        }
    };

    let mut project_ids: Vec<String> = recognized
        .values()
        .map(|v| v.project_id.clone())
        .collect();
    project_ids.sort();
    project_ids.dedup();

    let titles = match registry.project_titles(&project_ids).await {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!("Project title lookup failed: {}", e);
            HashMap::new()
        }
    };

    let recognized = Arc::new(recognized);
    let titles = Arc::new(titles);
    let semaphore = Arc::new(Semaphore::new(WORKER_THREADS));
    let mut handles = Vec::new();

    for (hash, filename) in hash_to_file {
        let registry = Arc::clone(&registry);
        let recognized = Arc::clone(&recognized);
        let titles = Arc::clone(&titles);
        let semaphore = Arc::clone(&semaphore);
        let options = options.clone();
        let tx = tx.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.unwrap();
            let record =
                reconcile_file(&*registry, &recognized, &titles, &hash, &filename, &options).await;
            let _ = tx.send(ScanEvent::Record(record)).await;
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Scan worker panicked: {}", e);
        }
    }

    let _ = tx.send(ScanEvent::Complete).await;
}

/// List mod archives in a folder and fingerprint each; unreadable files are
/// dropped. Two identical files collapse onto one hash entry.
fn hash_folder(folder: &Path) -> HashMap<String, String> {
    let mut hash_to_file = HashMap::new();

    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read folder {}: {}", folder.display(), e);
            return hash_to_file;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_mod = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(MOD_EXTENSION))
            .unwrap_or(false);
        if !is_mod || !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        if let Some(hash) = fingerprint::file_sha1(&path) {
            hash_to_file.insert(hash, filename);
        }
    }

    hash_to_file
}

async fn reconcile_file(
    registry: &dyn Registry,
    recognized: &HashMap<String, RegistryVersion>,
    titles: &HashMap<String, String>,
    hash: &str,
    filename: &str,
    options: &ScanOptions,
) -> ModRecord {
    let Some(installed) = recognized.get(hash) else {
        return ModRecord::unrecognized(filename);
    };

    let title = titles
        .get(&installed.project_id)
        .cloned()
        .unwrap_or_else(|| filename.to_string());

    let mut record = ModRecord {
        title,
        author: "Modrinth".to_string(),
        version: installed.version_number.clone(),
        status: ModStatus::Installed,
        download_url: None,
        download_filename: None,
        needs_update: false,
        project_id: Some(installed.project_id.clone()),
        original_filename: Some(filename.to_string()),
    };

    if !options.check_updates {
        return record;
    }

    let filter = VersionFilter {
        loader: options.loader.clone(),
        game_version: options.game_version.clone(),
    };

    // Any failure here keeps the record at Installed; a missed update check
    // must not look like an error.
    match registry
        .versions_for_project(&installed.project_id, Some(filter))
        .await
    {
        Ok(versions) => {
            // First entry is taken as newest; the registry orders responses
            // newest-first and we do not re-sort.
            if let Some(latest) = versions.first() {
                if latest.id == installed.id {
                    record.status = ModStatus::UpToDate;
                } else if let Some(file) = latest.primary_file() {
                    record.status = ModStatus::UpdateAvailable {
                        installed: installed.version_number.clone(),
                        latest: latest.version_number.clone(),
                    };
                    record.download_url = Some(file.url.clone());
                    record.download_filename = Some(file.filename.clone());
                    record.needs_update = true;
                }
            }
        }
        Err(e) => {
            tracing::debug!(
                "Update check failed for {}: {}",
                installed.project_id,
                e
            );
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MockRegistry, VersionFile};

    fn options(check_updates: bool) -> ScanOptions {
        ScanOptions {
            loader: "fabric".to_string(),
            game_version: "1.20.1".to_string(),
            check_updates,
        }
    }

    fn registry_version(id: &str, project_id: &str, number: &str) -> RegistryVersion {
        RegistryVersion {
            id: id.to_string(),
            project_id: project_id.to_string(),
            version_number: number.to_string(),
            version_type: "release".to_string(),
            loaders: vec!["fabric".to_string()],
            game_versions: vec!["1.20.1".to_string()],
            files: vec![VersionFile {
                url: format!("https://cdn.example/{}.jar", id),
                filename: format!("{}.jar", id),
            }],
        }
    }

    async fn collect(mut rx: mpsc::Receiver<ScanEvent>) -> (Vec<ModRecord>, bool) {
        let mut records = Vec::new();
        let mut completed = false;
        while let Some(event) = rx.recv().await {
            match event {
                ScanEvent::Record(record) => records.push(record),
                ScanEvent::Complete => {
                    completed = true;
                    assert!(rx.recv().await.is_none(), "events after Complete");
                }
            }
        }
        (records, completed)
    }

    #[tokio::test]
    async fn empty_folder_completes_with_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(MockRegistry::new());

        let rx = scan(registry, dir.path().to_path_buf(), options(false));
        let (records, completed) = collect(rx).await;

        assert!(records.is_empty());
        assert!(completed);
    }

    #[tokio::test]
    async fn nonexistent_folder_completes_immediately() {
        let registry = Arc::new(MockRegistry::new());

        let rx = scan(
            registry,
            PathBuf::from("/definitely/not/a/mods/folder"),
            options(true),
        );
        let (records, completed) = collect(rx).await;

        assert!(records.is_empty());
        assert!(completed);
    }

    #[tokio::test]
    async fn unmatched_hash_yields_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mystery.jar"), b"unknown bytes").unwrap();

        let mut registry = MockRegistry::new();
        registry
            .expect_resolve_by_hashes()
            .returning(|_| Ok(HashMap::new()));
        registry
            .expect_project_titles()
            .returning(|_| Ok(HashMap::new()));

        let rx = scan(Arc::new(registry), dir.path().to_path_buf(), options(true));
        let (records, completed) = collect(rx).await;

        assert!(completed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ModStatus::Unrecognized);
        assert_eq!(records[0].title, "mystery.jar");
        assert!(!records[0].needs_update);
    }

    #[tokio::test]
    async fn matching_latest_id_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sodium.jar"), b"sodium bytes").unwrap();
        let hash = crate::fingerprint::file_sha1(&dir.path().join("sodium.jar")).unwrap();

        let mut registry = MockRegistry::new();
        let installed = registry_version("ver1", "proj1", "0.5.0");
        registry.expect_resolve_by_hashes().returning(move |_| {
            Ok(HashMap::from([(hash.clone(), installed.clone())]))
        });
        registry.expect_project_titles().returning(|_| {
            Ok(HashMap::from([("proj1".to_string(), "Sodium".to_string())]))
        });
        registry
            .expect_versions_for_project()
            .returning(|_, _| Ok(vec![registry_version("ver1", "proj1", "0.5.0")]));

        let rx = scan(Arc::new(registry), dir.path().to_path_buf(), options(true));
        let (records, _) = collect(rx).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ModStatus::UpToDate);
        assert_eq!(records[0].title, "Sodium");
        assert!(!records[0].needs_update);
    }

    #[tokio::test]
    async fn differing_latest_id_signals_update() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sodium.jar"), b"old sodium").unwrap();
        let hash = crate::fingerprint::file_sha1(&dir.path().join("sodium.jar")).unwrap();

        let mut registry = MockRegistry::new();
        let installed = registry_version("ver1", "proj1", "0.5.0");
        registry.expect_resolve_by_hashes().returning(move |_| {
            Ok(HashMap::from([(hash.clone(), installed.clone())]))
        });
        registry.expect_project_titles().returning(|_| {
            Ok(HashMap::from([("proj1".to_string(), "Sodium".to_string())]))
        });
        registry
            .expect_versions_for_project()
            .returning(|_, _| Ok(vec![registry_version("ver2", "proj1", "0.6.0")]));

        let rx = scan(Arc::new(registry), dir.path().to_path_buf(), options(true));
        let (records, _) = collect(rx).await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(
            record.status,
            ModStatus::UpdateAvailable {
                installed: "0.5.0".to_string(),
                latest: "0.6.0".to_string(),
            }
        );
        assert!(record.needs_update);
        assert!(record.download_url.is_some());
        assert_eq!(record.download_filename.as_deref(), Some("ver2.jar"));
        // Both version numbers show up in the status text.
        let text = record.status.to_string();
        assert!(text.contains("0.5.0") && text.contains("0.6.0"));
    }

    #[tokio::test]
    async fn update_check_failure_keeps_installed_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lithium.jar"), b"lithium bytes").unwrap();
        let hash = crate::fingerprint::file_sha1(&dir.path().join("lithium.jar")).unwrap();

        let mut registry = MockRegistry::new();
        let installed = registry_version("ver9", "proj9", "1.0.0");
        registry.expect_resolve_by_hashes().returning(move |_| {
            Ok(HashMap::from([(hash.clone(), installed.clone())]))
        });
        registry
            .expect_project_titles()
            .returning(|_| Ok(HashMap::new()));
        registry.expect_versions_for_project().returning(|_, _| {
            Err(crate::error::RegistryError::Status {
                status: reqwest::StatusCode::GATEWAY_TIMEOUT,
                endpoint: "/project/proj9/version".to_string(),
            })
        });

        let rx = scan(Arc::new(registry), dir.path().to_path_buf(), options(true));
        let (records, completed) = collect(rx).await;

        assert!(completed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ModStatus::Installed);
        assert!(!records[0].needs_update);
    }

    #[tokio::test]
    async fn update_check_disabled_reports_installed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("iris.jar"), b"iris bytes").unwrap();
        let hash = crate::fingerprint::file_sha1(&dir.path().join("iris.jar")).unwrap();

        let mut registry = MockRegistry::new();
        let installed = registry_version("ver3", "proj3", "2.1.0");
        registry.expect_resolve_by_hashes().returning(move |_| {
            Ok(HashMap::from([(hash.clone(), installed.clone())]))
        });
        registry.expect_project_titles().returning(|_| {
            Ok(HashMap::from([("proj3".to_string(), "Iris".to_string())]))
        });
        // versions_for_project must not be called when updates are off.

        let rx = scan(Arc::new(registry), dir.path().to_path_buf(), options(false));
        let (records, _) = collect(rx).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ModStatus::Installed);
        assert_eq!(records[0].version, "2.1.0");
    }

    #[tokio::test]
    async fn batch_resolve_failure_degrades_to_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"aaa").unwrap();
        std::fs::write(dir.path().join("b.jar"), b"bbb").unwrap();

        let mut registry = MockRegistry::new();
        registry.expect_resolve_by_hashes().returning(|_| {
            Err(crate::error::RegistryError::Status {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                endpoint: "/version_files".to_string(),
            })
        });
        registry
            .expect_project_titles()
            .returning(|_| Ok(HashMap::new()));

        let rx = scan(Arc::new(registry), dir.path().to_path_buf(), options(true));
        let (records, completed) = collect(rx).await;

        assert!(completed);
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.status == ModStatus::Unrecognized));
    }
}

//! Stale-file sweeping before an update is installed
//!
//! When a newer version of a project is about to land in the mods folder,
//! the files it supersedes are removed so the loader does not see two copies
//! of the same mod. Matching is hash-based; a filename-based fallback runs
//! only when the batch hash lookup itself fails, not when it finds nothing.
//! The file the new download will be written to is never touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::fingerprint;
use crate::reconcile::MOD_EXTENSION;
use crate::registry::Registry;

/// Remove files in `folder` that belong to `project_id` and are superseded
/// by the incoming `new_filename`. Returns the paths actually removed.
///
/// Deletion is best-effort: individual failures are logged and skipped, and
/// a registry outage sweeps nothing rather than aborting the caller's
/// download.
pub async fn sweep_stale_files(
    registry: &dyn Registry,
    folder: &Path,
    project_id: &str,
    new_filename: &str,
) -> Vec<PathBuf> {
    let candidates = {
        let folder = folder.to_path_buf();
        let skip = new_filename.to_string();
        tokio::task::spawn_blocking(move || hash_candidates(&folder, &skip))
            .await
            .unwrap_or_default()
    };

    if candidates.is_empty() {
        return Vec::new();
    }

    let hashes: Vec<String> = candidates.iter().map(|(h, _)| h.clone()).collect();

    match registry.resolve_by_hashes(&hashes).await {
        Ok(resolved) => {
            let stale: Vec<&str> = candidates
                .iter()
                .filter(|(hash, _)| {
                    resolved
                        .get(hash)
                        .map(|v| v.project_id == project_id)
                        .unwrap_or(false)
                })
                .map(|(_, name)| name.as_str())
                .collect();

            remove_files(folder, &stale, new_filename).await
        }
        Err(e) => {
            tracing::warn!(
                "Hash-based sweep failed ({}), falling back to filename matching",
                e
            );
            sweep_by_filename(registry, folder, project_id, &candidates, new_filename).await
        }
    }
}

/// Fallback: every filename the project has ever published identifies a
/// stale file.
async fn sweep_by_filename(
    registry: &dyn Registry,
    folder: &Path,
    project_id: &str,
    candidates: &[(String, String)],
    new_filename: &str,
) -> Vec<PathBuf> {
    let versions = match registry.versions_for_project(project_id, None).await {
        Ok(versions) => versions,
        Err(e) => {
            tracing::warn!("Filename-based sweep also failed: {}", e);
            return Vec::new();
        }
    };

    let published: HashSet<&str> = versions
        .iter()
        .flat_map(|v| v.files.iter())
        .map(|f| f.filename.as_str())
        .collect();

    let stale: Vec<&str> = candidates
        .iter()
        .map(|(_, name)| name.as_str())
        .filter(|name| published.contains(name))
        .collect();

    remove_files(folder, &stale, new_filename).await
}

/// Hash every mod archive in the folder except the one the download will
/// overwrite. Unreadable files are skipped.
fn hash_candidates(folder: &Path, skip_filename: &str) -> Vec<(String, String)> {
    let mut candidates = Vec::new();

    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read folder {}: {}", folder.display(), e);
            return candidates;
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
        if filename == skip_filename {
            continue;
        }

        if let Some(hash) = fingerprint::file_sha1(&path) {
            candidates.push((hash, filename));
        }
    }

    candidates
}

async fn remove_files(folder: &Path, filenames: &[&str], new_filename: &str) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for name in filenames {
        // Double-checked: the incoming file must survive the sweep.
        if *name == new_filename {
            continue;
        }

        let path = folder.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Removed superseded file {}", path.display());
                removed.push(path);
            }
            Err(e) => {
                tracing::warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MockRegistry, RegistryVersion, VersionFile};
    use std::collections::HashMap;

    fn resolved_version(id: &str, project_id: &str) -> RegistryVersion {
        RegistryVersion {
            id: id.to_string(),
            project_id: project_id.to_string(),
            version_number: "1.0".to_string(),
            version_type: "release".to_string(),
            loaders: Vec::new(),
            game_versions: Vec::new(),
            files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn removes_hash_matched_files_of_same_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old-sodium.jar"), b"old sodium").unwrap();
        std::fs::write(dir.path().join("other-mod.jar"), b"other mod").unwrap();
        let old_hash = fingerprint::file_sha1(&dir.path().join("old-sodium.jar")).unwrap();
        let other_hash = fingerprint::file_sha1(&dir.path().join("other-mod.jar")).unwrap();

        let mut registry = MockRegistry::new();
        registry.expect_resolve_by_hashes().returning(move |_| {
            Ok(HashMap::from([
                (old_hash.clone(), resolved_version("v-old", "sodium")),
                (other_hash.clone(), resolved_version("v-x", "lithium")),
            ]))
        });

        let removed =
            sweep_stale_files(&registry, dir.path(), "sodium", "new-sodium.jar").await;

        assert_eq!(removed, vec![dir.path().join("old-sodium.jar")]);
        assert!(!dir.path().join("old-sodium.jar").exists());
        assert!(dir.path().join("other-mod.jar").exists());
    }

    #[tokio::test]
    async fn never_removes_the_incoming_filename() {
        let dir = tempfile::tempdir().unwrap();
        // Same name as the new download, and its hash resolves to the same
        // project; it must survive.
        std::fs::write(dir.path().join("sodium-1.1.jar"), b"already here").unwrap();
        std::fs::write(dir.path().join("sodium-1.0.jar"), b"older build").unwrap();
        let old_hash = fingerprint::file_sha1(&dir.path().join("sodium-1.0.jar")).unwrap();

        let mut registry = MockRegistry::new();
        registry.expect_resolve_by_hashes().returning(move |hashes| {
            // The incoming filename is excluded before hashing.
            assert_eq!(hashes.len(), 1);
            Ok(HashMap::from([(
                old_hash.clone(),
                resolved_version("v-old", "sodium"),
            )]))
        });

        let removed =
            sweep_stale_files(&registry, dir.path(), "sodium", "sodium-1.1.jar").await;

        assert_eq!(removed, vec![dir.path().join("sodium-1.0.jar")]);
        assert!(dir.path().join("sodium-1.1.jar").exists());
    }

    #[tokio::test]
    async fn filename_fallback_runs_only_when_batch_call_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sodium-0.9.jar"), b"published before").unwrap();
        std::fs::write(dir.path().join("unrelated.jar"), b"unrelated").unwrap();

        let mut registry = MockRegistry::new();
        registry.expect_resolve_by_hashes().returning(|_| {
            Err(crate::error::RegistryError::Status {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                endpoint: "/version_files".to_string(),
            })
        });
        registry
            .expect_versions_for_project()
            .withf(|project_id, filter| project_id == "sodium" && filter.is_none())
            .returning(|_, _| {
                Ok(vec![RegistryVersion {
                    id: "v1".to_string(),
                    project_id: "sodium".to_string(),
                    version_number: "0.9".to_string(),
                    version_type: "release".to_string(),
                    loaders: Vec::new(),
                    game_versions: Vec::new(),
                    files: vec![VersionFile {
                        url: "https://cdn.example/sodium-0.9.jar".to_string(),
                        filename: "sodium-0.9.jar".to_string(),
                    }],
                }])
            });

        let removed =
            sweep_stale_files(&registry, dir.path(), "sodium", "sodium-1.0.jar").await;

        assert_eq!(removed, vec![dir.path().join("sodium-0.9.jar")]);
        assert!(dir.path().join("unrelated.jar").exists());
    }

    #[tokio::test]
    async fn empty_hash_result_does_not_trigger_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("unknown.jar"), b"unknown").unwrap();

        let mut registry = MockRegistry::new();
        registry
            .expect_resolve_by_hashes()
            .returning(|_| Ok(HashMap::new()));
        // No expectation on versions_for_project: a call would panic.

        let removed = sweep_stale_files(&registry, dir.path(), "sodium", "new.jar").await;

        assert!(removed.is_empty());
        assert!(dir.path().join("unknown.jar").exists());
    }
}

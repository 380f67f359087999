//! Streaming file downloads with progress reporting
//!
//! One call, one outcome: there is no retry, and a failed transfer may leave
//! a partial file at the destination for the caller to handle. At most one
//! download may target a given destination path at a time; a duplicate start
//! fails immediately.

use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const USER_AGENT: &str = concat!("modrover/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Emission from an in-flight download
#[derive(Debug, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Floor percentage of bytes transferred; only sent when the total size
    /// is known, and only when the value changes
    Progress(u8),
    /// Terminal success with the written path
    Completed(PathBuf),
    /// Terminal failure; no further events follow
    Failed(String),
}

fn in_flight() -> &'static Mutex<HashSet<PathBuf>> {
    static IN_FLIGHT: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    IN_FLIGHT.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Claim on a destination path, released on drop.
struct DestinationClaim(PathBuf);

impl DestinationClaim {
    fn acquire(path: &Path) -> Option<Self> {
        let mut set = in_flight().lock().expect("in-flight set poisoned");
        if set.insert(path.to_path_buf()) {
            Some(Self(path.to_path_buf()))
        } else {
            None
        }
    }
}

impl Drop for DestinationClaim {
    fn drop(&mut self) {
        let mut set = in_flight().lock().expect("in-flight set poisoned");
        set.remove(&self.0);
    }
}

/// Start a download and return its event stream.
pub fn download(url: String, dest: PathBuf) -> mpsc::Receiver<DownloadEvent> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let event = match DestinationClaim::acquire(&dest) {
            Some(claim) => {
                let result = run_download(&url, &dest, &tx).await;
                drop(claim);
                match result {
                    Ok(()) => DownloadEvent::Completed(dest),
                    Err(reason) => DownloadEvent::Failed(reason),
                }
            }
            None => DownloadEvent::Failed(format!(
                "a download to {} is already in progress",
                dest.display()
            )),
        };
        let _ = tx.send(event).await;
    });

    rx
}

async fn run_download(
    url: &str,
    dest: &Path,
    tx: &mpsc::Sender<DownloadEvent>,
) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| format!("failed to create HTTP client: {}", e))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("server returned {}", response.status()));
    }

    let total = response.content_length().unwrap_or(0);

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| format!("cannot create {}: {}", dest.display(), e))?;

    let mut downloaded: u64 = 0;
    let mut last_percent: Option<u8> = None;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("transfer interrupted: {}", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("write failed: {}", e))?;
        downloaded += chunk.len() as u64;

        if total > 0 {
            let pct = percent(downloaded, total);
            if last_percent != Some(pct) {
                last_percent = Some(pct);
                let _ = tx.send(DownloadEvent::Progress(pct)).await;
            }
        }
    }

    file.flush()
        .await
        .map_err(|e| format!("flush failed: {}", e))?;

    Ok(())
}

fn percent(transferred: u64, total: u64) -> u8 {
    ((transferred * 100) / total).min(100) as u8
}

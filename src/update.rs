//! Application self-update check
//!
//! Best-effort: any failure is logged at debug level and reported as "no
//! update", never surfaced to the user as an error.

use serde::Deserialize;
use std::time::Duration;

use crate::version;

const RELEASES_URL: &str = "https://api.github.com/repos/modrover/modrover/releases/latest";
const USER_AGENT: &str = concat!("modrover/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    prerelease: bool,
}

/// Return the newer released version number, if one exists.
pub async fn check_for_updates(current_version: &str) -> Option<String> {
    let release = match fetch_latest_release().await {
        Ok(release) => release,
        Err(e) => {
            tracing::debug!("Update check failed: {}", e);
            return None;
        }
    };

    if release.prerelease {
        return None;
    }

    let latest = normalize_tag(&release.tag_name);
    if version::is_newer(&latest, current_version) {
        Some(latest)
    } else {
        None
    }
}

async fn fetch_latest_release() -> Result<Release, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let response = client.get(RELEASES_URL).send().await?;
    response.error_for_status()?.json::<Release>().await
}

fn normalize_tag(tag: &str) -> String {
    tag.trim_start_matches('v').to_string()
}

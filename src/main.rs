use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modrover::download::{self, DownloadEvent};
use modrover::reconcile::{self, ModRecord, ScanEvent, ScanOptions};
use modrover::registry::Registry;
use modrover::search::{self, SearchEvent, SearchOptions};
use modrover::{sweep, update, Config, ModrinthClient, APP_VERSION};

#[derive(Parser)]
#[command(name = "modrover")]
#[command(
    author,
    version = "0.2.0",
    about = "A CLI manager for Minecraft mods hosted on Modrinth"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a mods folder and report the status of each file
    Scan {
        /// Folder containing mod archives
        folder: PathBuf,

        /// Also check each recognized mod for available updates
        #[arg(long)]
        check_updates: bool,

        /// Mod loader override (e.g. fabric)
        #[arg(long)]
        loader: Option<String>,

        /// Game version override (e.g. 1.20.1)
        #[arg(long)]
        game_version: Option<String>,
    },

    /// Search the registry for mods matching a query
    Search {
        query: String,

        #[arg(long)]
        loader: Option<String>,

        #[arg(long)]
        game_version: Option<String>,
    },

    /// Update all outdated mods in a folder
    Update {
        /// Folder containing mod archives
        folder: PathBuf,

        #[arg(long)]
        loader: Option<String>,

        #[arg(long)]
        game_version: Option<String>,
    },

    /// Search for a mod and download the best match
    Fetch {
        query: String,

        #[arg(long)]
        loader: Option<String>,

        #[arg(long)]
        game_version: Option<String>,
    },

    /// List available loaders and game versions
    Tags,

    /// Show or change configuration
    Config {
        /// Directory downloaded mods are written to
        #[arg(long)]
        download_dir: Option<String>,

        /// Default mod loader
        #[arg(long)]
        loader: Option<String>,

        /// Default game version
        #[arg(long)]
        game_version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load().await?;
    config.paths.ensure_dirs()?;

    // Runs alongside the command; a failed check is silent.
    let update_check = tokio::spawn(update::check_for_updates(APP_VERSION));

    let result = match cli.command {
        Commands::Scan {
            folder,
            check_updates,
            loader,
            game_version,
        } => cmd_scan(&config, folder, check_updates, loader, game_version).await,
        Commands::Search {
            query,
            loader,
            game_version,
        } => cmd_search(&config, query, loader, game_version).await,
        Commands::Update {
            folder,
            loader,
            game_version,
        } => cmd_update(&config, folder, loader, game_version).await,
        Commands::Fetch {
            query,
            loader,
            game_version,
        } => cmd_fetch(&config, query, loader, game_version).await,
        Commands::Tags => cmd_tags().await,
        Commands::Config {
            download_dir,
            loader,
            game_version,
        } => cmd_config(&mut config, download_dir, loader, game_version).await,
    };

    if let Ok(Some(latest)) = update_check.await {
        eprintln!("A newer modrover ({}) is available", latest);
    }

    result
}

/// Loader/game-version context: explicit flag, then configured default.
fn resolve_context(
    config: &Config,
    loader: Option<String>,
    game_version: Option<String>,
) -> Result<(String, String)> {
    let loader = loader.or_else(|| config.loader.clone()).context(
        "no loader selected; pass --loader or set a default with `modrover config --loader <name>`",
    )?;
    let game_version = game_version.or_else(|| config.game_version.clone()).context(
        "no game version selected; pass --game-version or set a default with `modrover config --game-version <version>`",
    )?;
    Ok((loader, game_version))
}

fn print_record(record: &ModRecord) {
    println!(
        "{:<40} {:<12} {:<16} {}",
        truncate(&record.title, 40),
        truncate(&record.author, 12),
        truncate(&record.version, 16),
        record.status
    );
}

fn print_header() {
    println!(
        "{:<40} {:<12} {:<16} {}",
        "Mod", "Author", "Version", "Status"
    );
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

async fn cmd_scan(
    config: &Config,
    folder: PathBuf,
    check_updates: bool,
    loader: Option<String>,
    game_version: Option<String>,
) -> Result<()> {
    let (loader, game_version) = resolve_context(config, loader, game_version)?;
    let registry: Arc<dyn Registry> = Arc::new(ModrinthClient::new()?);

    let options = ScanOptions {
        loader,
        game_version,
        check_updates,
    };

    print_header();
    let mut rx = reconcile::scan(registry, folder, options);
    let mut total = 0usize;
    let mut updates = 0usize;

    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::Record(record) => {
                total += 1;
                if record.needs_update {
                    updates += 1;
                }
                print_record(&record);
            }
            ScanEvent::Complete => break,
        }
    }

    println!();
    if updates > 0 {
        println!(
            "{} file(s) scanned, {} update(s) available (run `modrover update`)",
            total, updates
        );
    } else {
        println!("{} file(s) scanned", total);
    }

    Ok(())
}

async fn cmd_search(
    config: &Config,
    query: String,
    loader: Option<String>,
    game_version: Option<String>,
) -> Result<()> {
    let (loader, game_version) = resolve_context(config, loader, game_version)?;
    let registry: Arc<dyn Registry> = Arc::new(ModrinthClient::new()?);

    let options = SearchOptions {
        loader,
        game_version,
    };

    print_header();
    let mut rx = search::search_mods(registry, query, options);
    let mut total = 0usize;

    while let Some(event) = rx.recv().await {
        match event {
            SearchEvent::Record(record) => {
                total += 1;
                print_record(&record);
            }
            SearchEvent::Complete { success } => {
                if !success {
                    anyhow::bail!("search failed; the registry is unreachable");
                }
                break;
            }
        }
    }

    println!();
    println!("{} match(es)", total);
    Ok(())
}

async fn cmd_update(
    config: &Config,
    folder: PathBuf,
    loader: Option<String>,
    game_version: Option<String>,
) -> Result<()> {
    let (loader, game_version) = resolve_context(config, loader, game_version)?;
    let registry: Arc<dyn Registry> = Arc::new(ModrinthClient::new()?);

    let options = ScanOptions {
        loader,
        game_version,
        check_updates: true,
    };

    let mut rx = reconcile::scan(Arc::clone(&registry), folder.clone(), options);
    let mut outdated = Vec::new();

    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::Record(record) if record.needs_update => outdated.push(record),
            ScanEvent::Record(_) => {}
            ScanEvent::Complete => break,
        }
    }

    if outdated.is_empty() {
        println!("Everything is up to date");
        return Ok(());
    }

    println!("Updating {} mod(s)", outdated.len());

    let failures = apply_updates(&registry, &folder, outdated).await;
    if failures > 0 {
        anyhow::bail!("{} update(s) failed", failures);
    }

    Ok(())
}

/// Sweep and download each outdated record; a failed download is reported
/// and the remaining updates still run. Returns the failure count.
async fn apply_updates(
    registry: &Arc<dyn Registry>,
    folder: &Path,
    outdated: Vec<ModRecord>,
) -> usize {
    let mut failures = 0usize;

    for record in outdated {
        let (Some(url), Some(filename)) =
            (record.download_url.clone(), record.download_filename.clone())
        else {
            continue;
        };

        if let Some(project_id) = record.project_id.as_deref() {
            let removed =
                sweep::sweep_stale_files(&**registry, folder, project_id, &filename).await;
            for path in removed {
                println!("  removed {}", path.display());
            }
        }

        println!("  {} -> {}", record.title, filename);
        if let Err(e) = fetch_to(&url, folder.join(&filename)).await {
            tracing::warn!("Update of {} failed: {}", record.title, e);
            eprintln!("  failed: {}", e);
            failures += 1;
        }
    }

    failures
}

async fn cmd_fetch(
    config: &Config,
    query: String,
    loader: Option<String>,
    game_version: Option<String>,
) -> Result<()> {
    // Surface a missing download directory before any network work.
    let dest_dir = config.download_dir()?;
    let (loader, game_version) = resolve_context(config, loader, game_version)?;
    let registry: Arc<dyn Registry> = Arc::new(ModrinthClient::new()?);

    let options = SearchOptions {
        loader,
        game_version,
    };

    let best = search::find_best(registry, &query, options)
        .await
        .context("search failed; the registry is unreachable")?
        .with_context(|| format!("no mod matching '{}' found", query))?;

    let (Some(url), Some(filename)) = (best.download_url.clone(), best.download_filename.clone())
    else {
        anyhow::bail!("'{}' has no downloadable file", best.title);
    };

    tokio::fs::create_dir_all(&dest_dir)
        .await
        .context("Failed to create download directory")?;

    println!("Downloading {} {} -> {}", best.title, best.version, filename);
    fetch_to(&url, dest_dir.join(&filename)).await
}

/// Consume a download's event stream, rendering progress.
async fn fetch_to(url: &str, dest: PathBuf) -> Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("  [{bar:30}] {pos:>3}%")
            .expect("valid progress template")
            .progress_chars("=> "),
    );

    let mut rx = download::download(url.to_string(), dest);

    while let Some(event) = rx.recv().await {
        match event {
            DownloadEvent::Progress(pct) => bar.set_position(pct as u64),
            DownloadEvent::Completed(path) => {
                bar.finish_and_clear();
                println!("  saved {}", path.display());
                return Ok(());
            }
            DownloadEvent::Failed(reason) => {
                bar.abandon();
                anyhow::bail!("download failed: {}", reason);
            }
        }
    }

    anyhow::bail!("download ended without a result");
}

async fn cmd_tags() -> Result<()> {
    let registry = ModrinthClient::new()?;

    // The tool is unusable without these lists, so a failure here is the one
    // place a registry error stops the command outright.
    let loaders = registry
        .loaders()
        .await
        .context("Failed to load loader list from the registry")?;
    let versions = registry
        .game_versions()
        .await
        .context("Failed to load game version list from the registry")?;

    println!("Loaders:");
    for name in loaders {
        println!("  {}", name);
    }

    println!("Game versions (latest first):");
    for version in versions.iter().take(20) {
        println!("  {}", version);
    }
    if versions.len() > 20 {
        println!("  ... and {} more", versions.len() - 20);
    }

    Ok(())
}

async fn cmd_config(
    config: &mut Config,
    download_dir: Option<String>,
    loader: Option<String>,
    game_version: Option<String>,
) -> Result<()> {
    let changed = download_dir.is_some() || loader.is_some() || game_version.is_some();

    if let Some(dir) = download_dir {
        config.download_dir = Some(dir);
    }
    if let Some(loader) = loader {
        config.loader = Some(loader.to_lowercase());
    }
    if let Some(version) = game_version {
        config.game_version = Some(version);
    }

    if changed {
        config.save().await?;
        println!("Configuration saved");
    }

    println!(
        "download_dir  = {}",
        config.download_dir.as_deref().unwrap_or("(unset)")
    );
    println!(
        "loader        = {}",
        config.loader.as_deref().unwrap_or("(unset)")
    );
    println!(
        "game_version  = {}",
        config.game_version.as_deref().unwrap_or("(unset)")
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modrover::ModStatus;

    fn outdated_record(index: usize) -> ModRecord {
        let mut record = ModRecord::unrecognized(&format!("mod{}.jar", index));
        record.title = format!("Mod {}", index);
        record.status = ModStatus::UpdateAvailable {
            installed: "1.0".to_string(),
            latest: "2.0".to_string(),
        };
        // Port 9 (discard) is not listening, so every download fails fast.
        record.download_url = Some("http://127.0.0.1:9/mod.jar".to_string());
        record.download_filename = Some(format!("mod{}-2.0.jar", index));
        record.needs_update = true;
        record
    }

    #[tokio::test]
    async fn failed_download_does_not_abort_remaining_updates() {
        let dir = tempfile::tempdir().unwrap();
        let registry: Arc<dyn Registry> = Arc::new(ModrinthClient::new().unwrap());

        let outdated = vec![outdated_record(0), outdated_record(1)];
        let failures = apply_updates(&registry, dir.path(), outdated).await;

        assert_eq!(failures, 2, "both downloads were attempted");
    }
}

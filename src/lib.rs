//! Modrover - a CLI manager for Minecraft mods hosted on Modrinth
//!
//! This crate provides:
//! - Folder reconciliation: match local mod files against the registry by
//!   content hash and classify each as unrecognized, current, or outdated
//! - Ranked mod search with automatic version resolution
//! - Streaming downloads with progress reporting
//! - Stale-file sweeping when an update replaces an older build

pub const APP_VERSION: &str = "0.2.0";

/// Size of the bounded worker pool used for per-item registry fan-out
pub const WORKER_THREADS: usize = 8;

pub mod config;
pub mod download;
pub mod error;
pub mod fingerprint;
pub mod reconcile;
pub mod registry;
pub mod search;
pub mod sweep;
pub mod update;
pub mod version;

pub use config::Config;
pub use reconcile::{ModRecord, ModStatus};
pub use registry::ModrinthClient;

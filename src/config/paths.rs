//! XDG-compliant path management

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths following the XDG base directory specification
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: ProjectDirs,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let dirs = ProjectDirs::from("", "", "modrover")
            .expect("Failed to determine project directories");
        Self { dirs }
    }

    /// Config directory: ~/.config/modrover/
    pub fn config_dir(&self) -> PathBuf {
        self.dirs.config_dir().to_path_buf()
    }

    /// Main config file: ~/.config/modrover/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// Ensure required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        Ok(())
    }
}

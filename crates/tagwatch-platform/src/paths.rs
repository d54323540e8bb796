use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "tagwatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Could not determine the user {kind} directory")]
pub struct AppPathsError {
    pub kind: &'static str,
}

/// Where the updater keeps its settings, token, resolver state, downloads
/// and debug log.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

fn user_dir(base: Option<PathBuf>, kind: &'static str) -> Result<PathBuf, AppPathsError> {
    base.map(|dir| dir.join(APP_DIR))
        .ok_or(AppPathsError { kind })
}

impl AppPaths {
    /// Per-user locations for the current platform.
    ///
    /// # Errors
    /// Returns an error when the platform has no config, cache or data
    /// directory for the current user.
    pub fn new() -> Result<Self, AppPathsError> {
        Ok(Self {
            config_dir: user_dir(dirs::config_dir(), "config")?,
            cache_dir: user_dir(dirs::cache_dir(), "cache")?,
            data_dir: user_dir(dirs::data_dir(), "data")?,
        })
    }

    /// Everything under one directory, for hosts that keep the updater's
    /// files beside the plugin.
    #[must_use]
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn token_file(&self) -> PathBuf {
        self.config_dir.join("token")
    }

    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.cache_dir.join("state.json")
    }

    /// Verified packages are kept here until the host installs them.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.config_dir.clone(),
            self.download_dir(),
            self.data_dir.clone(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

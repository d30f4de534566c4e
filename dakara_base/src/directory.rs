//! # Directory Module
//!
//! Resolution of the per-OS directories used by the applications. The
//! standard locations come from the `dirs` crate and are suffixed with the
//! application name, e.g. `~/.config/dakara` on Linux.

use std::path::PathBuf;

/// Name of the application, used as directory suffix.
pub const APP_NAME: &str = "dakara";

/// Name of the project.
pub const PROJECT_NAME: &str = "DakaraProject";

/// Application directories resolver.
///
/// Every getter returns `None` when the standard location cannot be
/// determined on the current system.
#[derive(Debug, Clone)]
pub struct AppDirs {
    app_name: String,
}

impl Default for AppDirs {
    fn default() -> Self {
        Self::new(APP_NAME)
    }
}

impl AppDirs {
    /// Create a resolver for the given application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Directory for cached data.
    pub fn user_cache_dir(&self) -> Option<PathBuf> {
        dirs::cache_dir().map(|directory| directory.join(&self.app_name))
    }

    /// Directory for configuration files.
    pub fn user_config_dir(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|directory| directory.join(&self.app_name))
    }

    /// Directory for persistent application data.
    pub fn user_data_dir(&self) -> Option<PathBuf> {
        dirs::data_dir().map(|directory| directory.join(&self.app_name))
    }

    /// Directory for state data that should persist between restarts.
    ///
    /// Falls back to the local data directory on systems without a
    /// dedicated state location.
    pub fn user_state_dir(&self) -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|directory| directory.join(&self.app_name))
    }

    /// Directory for runtime files such as sockets. Linux only.
    pub fn user_runtime_dir(&self) -> Option<PathBuf> {
        dirs::runtime_dir().map(|directory| directory.join(&self.app_name))
    }

    /// Directory for log files.
    pub fn user_log_dir(&self) -> Option<PathBuf> {
        if cfg!(target_os = "macos") {
            dirs::home_dir().map(|home| home.join("Library/Logs").join(&self.app_name))
        } else if cfg!(windows) {
            dirs::data_local_dir().map(|directory| directory.join(&self.app_name).join("Logs"))
        } else {
            self.user_state_dir().map(|directory| directory.join("log"))
        }
    }
}

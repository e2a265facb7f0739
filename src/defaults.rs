//! Default values for kit-merge settings.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Remote that kit and umbrella trees are pushed to.
pub const DEFAULT_REMOTE: &str = "origin";

/// Branch used for repositories whose branch is not otherwise configured.
pub const DEFAULT_BRANCH: &str = "master";

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "KIT_MERGE_SETTINGS";

/// Environment variable naming the metadata cache generator.
pub const EGENCACHE_ENV: &str = "KIT_MERGE_EGENCACHE";

/// Returns the root directory for all working trees.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/kit-merge` (XDG Base Directory)
/// - macOS: `~/Library/Caches/kit-merge`
///
/// Falls back to `.kit-merge` in the current directory if the platform cache
/// directory cannot be determined.
pub fn default_work_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".kit-merge"))
        .join("kit-merge")
}

pub fn default_source_dir() -> PathBuf {
    default_work_root().join("source-trees")
}

pub fn default_destination_dir() -> PathBuf {
    default_work_root().join("dest-trees")
}

pub fn default_cache_dir() -> PathBuf {
    default_work_root().join("edb")
}

/// `~/.merge`, or `None` when the home directory is unknown.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".merge"))
}

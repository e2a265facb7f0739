//! Metadata-cache collaborator.
//!
//! Generating the derived metadata cache of a finished kit is delegated to
//! `egencache`. The pipeline only sees the [`MetadataCache`] trait.

use std::fs;
use std::path::Path;
use std::process::Command;

use log::{debug, info};

use crate::error::{Error, Result};

pub trait MetadataCache {
    /// Regenerate the metadata cache for the tree at `tree_root`, writing
    /// intermediate state into `cache_dir`.
    fn generate_cache(&self, tree_root: &Path, cache_dir: &Path) -> Result<()>;
}

/// Runs `egencache --update` against the kit tree.
#[derive(Debug, Clone)]
pub struct Egencache {
    pub program: String,
    pub jobs: usize,
}

impl Default for Egencache {
    fn default() -> Self {
        Self {
            program: "egencache".to_string(),
            jobs: 12,
        }
    }
}

impl MetadataCache for Egencache {
    fn generate_cache(&self, tree_root: &Path, cache_dir: &Path) -> Result<()> {
        fs::create_dir_all(cache_dir)?;
        let args = [
            "--update".to_string(),
            format!("--portdir={}", tree_root.display()),
            format!("--cache-dir={}", cache_dir.display()),
            format!("--jobs={}", self.jobs),
        ];
        debug!("{} {}", self.program, args.join(" "));
        info!("Generating metadata cache for {}", tree_root.display());

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| Error::external(&self.program, tree_root.display(), e.to_string()))?;

        if !output.status.success() {
            return Err(Error::external(
                &self.program,
                tree_root.display(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(())
    }
}

//! # Settings File
//!
//! Site-specific settings live in an INI file (`~/.merge` by default):
//!
//! ```ini
//! [sources]
//! gentoo-staging = repos@git.example.org:ports/gentoo-staging.git
//!
//! [destinations]
//! base_url = https://github.com/example
//!
//! [branches]
//! kit-fixups = master
//!
//! [work]
//! source = /var/git/source-trees
//! destination = /var/git/dest-trees
//! cache = /var/cache/edb
//! ```
//!
//! `[sources]` and `[branches]` override the URL and branch of any named
//! repository from the generation definitions. Unknown sections or keys are
//! rejected.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ini::Ini;
use log::debug;

use crate::defaults;
use crate::error::{Error, Result};

const WORK_KEYS: &[&str] = &["source", "destination", "cache"];
const DESTINATION_KEYS: &[&str] = &["base_url"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Repository URL overrides, by repository name
    pub sources: BTreeMap<String, String>,
    /// Branch overrides, by repository name
    pub branches: BTreeMap<String, String>,
    /// URL prefix for kit and umbrella remotes
    pub base_url: Option<String>,
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
            branches: BTreeMap::new(),
            base_url: None,
            source_dir: defaults::default_source_dir(),
            destination_dir: defaults::default_destination_dir(),
            cache_dir: defaults::default_cache_dir(),
        }
    }
}

impl Settings {
    /// Locate and load the settings file.
    ///
    /// An explicit path (flag or environment) must exist. The default
    /// `~/.merge` is optional.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::Settings {
                    message: format!("settings file {} does not exist", path.display()),
                });
            }
            return Self::load(path);
        }
        match defaults::default_settings_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => {
                debug!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let ini = Ini::load_from_str(content)?;
        let mut settings = Self::default();

        for (section, properties) in ini.iter() {
            let section = match section {
                Some(section) => section,
                None if properties.iter().next().is_none() => continue,
                None => {
                    return Err(Error::Settings {
                        message: "settings must appear inside a [section]".to_string(),
                    })
                }
            };
            for (key, value) in properties.iter() {
                match section {
                    "sources" => {
                        settings.sources.insert(key.to_string(), value.to_string());
                    }
                    "branches" => {
                        settings.branches.insert(key.to_string(), value.to_string());
                    }
                    "destinations" => {
                        check_key(section, key, DESTINATION_KEYS)?;
                        settings.base_url = Some(value.trim_end_matches('/').to_string());
                    }
                    "work" => {
                        check_key(section, key, WORK_KEYS)?;
                        let dir = PathBuf::from(value);
                        match key {
                            "source" => settings.source_dir = dir,
                            "destination" => settings.destination_dir = dir,
                            _ => settings.cache_dir = dir,
                        }
                    }
                    other => {
                        return Err(Error::Settings {
                            message: format!("unknown section [{}]", other),
                        })
                    }
                }
            }
        }
        Ok(settings)
    }

    /// Remote URL of a destination repository such as a kit.
    pub fn destination_url(&self, name: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, name))
    }
}

fn check_key(section: &str, key: &str, valid: &[&str]) -> Result<()> {
    if valid.contains(&key) {
        Ok(())
    } else {
        Err(Error::Settings {
            message: format!("[{}] option {} is invalid", section, key),
        })
    }
}

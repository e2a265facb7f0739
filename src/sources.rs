//! # Source Repository Set
//!
//! Turns the repository definitions into checked-out [`SourceRepo`]s. Each
//! `(repository, pin)` pair gets its own working tree under the source work
//! directory and is checked out at most once per run, however many kit
//! sources share it.
//!
//! A pin that cannot be checked out is a configuration error: the run stops
//! before any kit is touched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::{FixupsDef, GenerationConfig, Pin, RepositoryDef, SourceEntry};
use crate::error::{Error, Result};
use crate::package::PackageId;
use crate::path::encode_pin;
use crate::repository::VcsOperations;
use crate::tree::Tree;

/// A source repository checked out at its pin.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRepo {
    pub name: String,
    pub url: String,
    pub pin: Pin,
    pub root: PathBuf,
    /// Allow-list; `None` means every package may be drawn
    pub select: Option<BTreeSet<PackageId>>,
    pub eclasses: Vec<String>,
    pub copyfiles: BTreeMap<String, String>,
    /// Resolved head of the checkout
    pub commit_id: String,
}

impl SourceRepo {
    pub fn tree(&self) -> Tree {
        Tree::new(self.name.as_str(), self.root.as_path())
    }

    /// Whether the allow-list lets `id` be drawn from this repository.
    pub fn allows(&self, id: &PackageId) -> bool {
        self.select.as_ref().is_none_or(|select| select.contains(id))
    }

    /// Eclasses this repository may contribute to closure resolution:
    /// `None` when unrestricted, otherwise those reachable from the
    /// allow-listed packages.
    pub fn allowed_eclasses(&self) -> Result<Option<BTreeSet<String>>> {
        match &self.select {
            None => Ok(None),
            Some(select) => self.tree().reachable_eclasses(select.iter()).map(Some),
        }
    }

    /// Licenses this repository may contribute, analogous to
    /// [`SourceRepo::allowed_eclasses`].
    pub fn allowed_licenses(&self) -> Result<Option<BTreeSet<String>>> {
        match &self.select {
            None => Ok(None),
            Some(select) => self.tree().package_license_refs(select.iter()).map(Some),
        }
    }
}

pub struct SourceRepositorySet<'a> {
    work_dir: PathBuf,
    vcs: &'a dyn VcsOperations,
    checkouts: BTreeMap<(String, Pin), SourceRepo>,
}

impl<'a> SourceRepositorySet<'a> {
    pub fn new(work_dir: impl Into<PathBuf>, vcs: &'a dyn VcsOperations) -> Self {
        Self {
            work_dir: work_dir.into(),
            vcs,
            checkouts: BTreeMap::new(),
        }
    }

    /// Working tree of a repository at a pin.
    pub fn checkout_dir(&self, name: &str, pin: &Pin) -> PathBuf {
        self.work_dir
            .join(format!("{}-{}", name, encode_pin(pin.reference())))
    }

    /// The repositories of a kit source, in precedence order.
    pub fn kit_source(&mut self, config: &GenerationConfig, name: &str) -> Result<Vec<SourceRepo>> {
        let entries = config.kit_source(name)?;
        entries
            .iter()
            .map(|entry| self.entry(config, entry))
            .collect()
    }

    /// One repository entry (kit source or supplemental).
    pub fn entry(&mut self, config: &GenerationConfig, entry: &SourceEntry) -> Result<SourceRepo> {
        let def = config.repository(&entry.repo)?;
        let pin = entry.pin()?;
        self.resolve(&entry.repo, def, pin)
    }

    /// The fix-up repository, tracked at its branch.
    pub fn fixups(&mut self, fixups: &FixupsDef) -> Result<SourceRepo> {
        let def = RepositoryDef {
            url: fixups.url.clone(),
            select: None,
            eclasses: Vec::new(),
            copyfiles: BTreeMap::new(),
        };
        self.resolve(&fixups.name, &def, Pin::Branch(fixups.branch.clone()))
    }

    fn resolve(&mut self, name: &str, def: &RepositoryDef, pin: Pin) -> Result<SourceRepo> {
        let key = (name.to_string(), pin.clone());
        if let Some(existing) = self.checkouts.get(&key) {
            debug!("Reusing checkout of {} at {}", name, pin);
            return Ok(existing.clone());
        }

        let root = self.checkout_dir(name, &pin);
        info!("Checking out {} at {}", name, pin);
        self.vcs.ensure_clone(&def.url, &root)?;
        self.vcs
            .checkout_pin(&root, &pin)
            .map_err(|e| Error::Configuration {
                message: format!("cannot check out {} of repository {}: {}", pin, name, e),
                hint: Some(format!("check the pin of {} in kit_sources", name)),
            })?;
        let commit_id = self.vcs.head_commit_id(&root)?;

        let repo = SourceRepo {
            name: name.to_string(),
            url: def.url.clone(),
            pin,
            root,
            select: def.select.as_ref().map(|s| s.iter().cloned().collect()),
            eclasses: def.eclasses.clone(),
            copyfiles: def.copyfiles.clone(),
            commit_id,
        };
        self.checkouts.insert(key, repo.clone());
        Ok(repo)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

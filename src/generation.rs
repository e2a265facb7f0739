//! # Generation Controller
//!
//! Runs every kit of the generation order, one at a time, against a single
//! [`ExclusivityLedger`]. A `reset` entry in the order clears the ledger so
//! the groups after it can draw from the full upstream set again.
//!
//! After the last kit, published kits are checked out at their branch and,
//! when an umbrella repository is configured, its `metadata/kit-info.json`
//! and `metadata/kit-sha1.json` are rewritten and committed.
//!
//! Any error stops the run. Kits already committed stay committed; the kit
//! that failed and every kit after it are left untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::config::{GenerationConfig, KitDef, Sequenced};
use crate::defaults::DEFAULT_REMOTE;
use crate::error::Result;
use crate::ledger::{ExclusivityLedger, LedgerReport};
use crate::phases::orchestrator::{execute_kit, KitOutcome};
use crate::phases::{selection, Collaborators, KitContext, RunMode};
use crate::settings::Settings;
use crate::sources::{SourceRepo, SourceRepositorySet};

/// Options of one generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Push kits and the umbrella to their remotes
    pub push: bool,
    /// Only generate these kits; empty means all. Other kits still claim
    /// their packages so exclusivity matches a full run.
    pub kits: Vec<String>,
    /// Write the ledger report here
    pub report: Option<PathBuf>,
}

impl GenerationOptions {
    fn includes(&self, kit: &KitDef) -> bool {
        self.kits.is_empty() || self.kits.iter().any(|k| *k == kit.name)
    }
}

/// A kit checked out at its published branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedKit {
    pub name: String,
    pub branch: String,
    pub head: String,
}

/// `metadata/kit-info.json` of the umbrella repository.
#[derive(Debug, Serialize, PartialEq)]
pub struct KitInfo {
    /// Kit names in generation order
    pub kit_order: Vec<String>,
    /// Branches of every kit, in generation order
    pub kit_branches: BTreeMap<String, Vec<String>>,
}

/// Result of a complete run.
#[derive(Debug)]
pub struct GenerationSummary {
    pub kits: Vec<KitOutcome>,
    pub published: Vec<PublishedKit>,
    pub umbrella_commit: Option<String>,
    pub report: LedgerReport,
}

pub struct Generation<'a> {
    config: &'a GenerationConfig,
    settings: &'a Settings,
    collab: Collaborators<'a>,
    options: GenerationOptions,
}

impl<'a> Generation<'a> {
    pub fn new(
        config: &'a GenerationConfig,
        settings: &'a Settings,
        collab: Collaborators<'a>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            config,
            settings,
            collab,
            options,
        }
    }

    /// Working tree of a destination repository.
    pub fn destination(&self, name: &str) -> PathBuf {
        self.settings.destination_dir.join(name)
    }

    fn run_mode(&self, name: &str) -> RunMode {
        RunMode {
            push: self.options.push,
            remote: DEFAULT_REMOTE.to_string(),
            url: self.settings.destination_url(name),
        }
    }

    /// Generate every kit, then publish.
    pub fn run(&self) -> Result<GenerationSummary> {
        self.config.validate()?;

        let mut sources = SourceRepositorySet::new(&self.settings.source_dir, self.collab.vcs);
        let fixups = sources.fixups(&self.config.fixups)?;
        let supplemental = self
            .config
            .supplemental
            .iter()
            .map(|entry| sources.entry(self.config, entry))
            .collect::<Result<Vec<SourceRepo>>>()?;

        let mut ledger = ExclusivityLedger::new();
        let mut kits = Vec::new();
        for item in self.config.sequence() {
            let (group, kit) = match item {
                Sequenced::Reset => {
                    info!("Scope boundary: releasing {} claims", ledger.len());
                    ledger.reset();
                    continue;
                }
                Sequenced::Kit { group, kit } => (group, kit),
            };
            let kit_sources = sources.kit_source(self.config, &kit.source)?;
            let packages = self.config.package_set(kit)?;

            if !self.options.includes(kit) {
                debug!("{}: not selected, claiming only", kit.name);
                selection::plan(&kit.name, &kit_sources, &packages, &mut ledger)?;
                continue;
            }

            debug!("{}: group {}", kit.name, group);
            let ctx = KitContext {
                kit,
                tree_root: self.destination(&kit.name),
                sources: kit_sources,
                supplemental: supplemental.clone(),
                fixups: fixups.clone(),
                packages,
                cache_dir: self
                    .settings
                    .cache_dir
                    .join(format!("{}-{}", kit.name, kit.branch)),
            };
            let outcome = execute_kit(&ctx, &self.collab, &self.run_mode(&kit.name), &mut ledger)?;
            kits.push(outcome);
        }

        let published = self.publish()?;
        let umbrella_commit = self.update_umbrella(&published)?;
        let report = ledger.report();
        if let Some(path) = &self.options.report {
            report.write(path)?;
            info!("Ledger report written to {}", path.display());
        }

        Ok(GenerationSummary {
            kits,
            published,
            umbrella_commit,
            report,
        })
    }

    /// Check out every published kit at its branch. Kits without a working
    /// tree (never generated here) are skipped.
    fn publish(&self) -> Result<Vec<PublishedKit>> {
        let mut published = Vec::new();
        for item in self.config.sequence() {
            let Sequenced::Kit { kit, .. } = item else {
                continue;
            };
            if !kit.publish {
                continue;
            }
            let root = self.destination(&kit.name);
            if !root.join(".git").exists() && !self.options.includes(kit) {
                debug!("{}: no working tree, not published", kit.name);
                continue;
            }
            self.collab.vcs.checkout_branch(&root, &kit.branch)?;
            published.push(PublishedKit {
                name: kit.name.clone(),
                branch: kit.branch.clone(),
                head: self.collab.vcs.head_commit_id(&root)?,
            });
        }
        Ok(published)
    }

    /// The kit order and branches recorded in the umbrella.
    pub fn kit_info(&self) -> KitInfo {
        let mut kit_order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut kit_branches: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for item in self.config.sequence() {
            let Sequenced::Kit { kit, .. } = item else {
                continue;
            };
            if seen.insert(kit.name.as_str()) {
                kit_order.push(kit.name.clone());
            }
            let branches = kit_branches.entry(kit.name.clone()).or_default();
            if !branches.contains(&kit.branch) {
                branches.push(kit.branch.clone());
            }
        }
        KitInfo {
            kit_order,
            kit_branches,
        }
    }

    fn update_umbrella(&self, published: &[PublishedKit]) -> Result<Option<String>> {
        let Some(umbrella) = &self.config.umbrella else {
            return Ok(None);
        };
        let vcs = self.collab.vcs;
        let root = self.destination(&umbrella.name);
        if self.options.push {
            vcs.ensure_clone(&umbrella.url, &root)?;
        } else if !root.join(".git").exists() {
            vcs.init(&root, &umbrella.branch)?;
        }
        vcs.checkout_branch(&root, &umbrella.branch)?;

        let mut sha1: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
        for kit in published {
            sha1.entry(kit.name.as_str())
                .or_default()
                .insert(kit.branch.as_str(), kit.head.as_str());
        }
        write_json(&root, "kit-info.json", &self.kit_info())?;
        write_json(&root, "kit-sha1.json", &sha1)?;

        let commit = vcs.commit(&root, "kit updates")?;
        if self.options.push {
            vcs.push(&root, DEFAULT_REMOTE, &umbrella.branch)?;
        }
        info!("{} updated with {} published kits", umbrella.name, published.len());
        Ok(commit)
    }
}

fn write_json<T: Serialize>(root: &Path, file: &str, value: &T) -> Result<()> {
    let dir = root.join("metadata");
    fs::create_dir_all(&dir)?;
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(dir.join(file), text)?;
    Ok(())
}

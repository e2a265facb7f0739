//! Phase 2: Selection
//!
//! Draws packages from the kit source into the kit tree. Repositories are
//! visited in precedence order and a package is taken from the first
//! repository offering it; later offers are shadowed. A package is eligible
//! when the kit's package set matches it, the repository's allow-list admits
//! it and no kit of the current scope has claimed it yet.
//!
//! Claims are made through the shared [`ExclusivityLedger`], which is also
//! how shadowing is enforced: once the earlier repository claims an id for
//! this kit, the later claim fails.

use std::collections::BTreeSet;

use log::{debug, info};

use super::{Collaborators, KitContext};
use crate::error::Result;
use crate::filesystem::SyncOptions;
use crate::ledger::ExclusivityLedger;
use crate::package::{PackageId, PackageSet};
use crate::sources::SourceRepo;
use crate::steps::{insert_eclasses, InsertEclassesOp, Insertions};

/// Packages one repository contributes to a kit.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSelection {
    pub repo: String,
    pub packages: Vec<PackageId>,
}

/// Result of the selection phase.
#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    /// Per-repository selections, in source order. Repositories that
    /// contributed nothing are absent.
    pub selections: Vec<RepoSelection>,
}

impl SelectionOutcome {
    /// Names of the repositories that contributed at least one package.
    pub fn contributors(&self) -> Vec<&str> {
        self.selections.iter().map(|s| s.repo.as_str()).collect()
    }

    pub fn packages(&self) -> BTreeSet<PackageId> {
        self.selections
            .iter()
            .flat_map(|s| s.packages.iter().cloned())
            .collect()
    }

    /// Fold in packages that `pre` or `post` steps inserted.
    pub fn add_insertions(&mut self, insertions: Insertions) {
        for (repo, packages) in insertions {
            match self.selections.iter_mut().find(|s| s.repo == repo) {
                Some(selection) => {
                    for id in packages {
                        if !selection.packages.contains(&id) {
                            selection.packages.push(id);
                        }
                    }
                }
                None => self.selections.push(RepoSelection { repo, packages }),
            }
        }
    }
}

/// Decide which packages `kit` takes from each repository and claim them in
/// the ledger. Nothing is written to disk.
///
/// This is also run on its own for kits excluded from a run, so the ledger
/// holds the same claims as in a full run.
pub fn plan(
    kit: &str,
    sources: &[SourceRepo],
    packages: &PackageSet,
    ledger: &mut ExclusivityLedger,
) -> Result<SelectionOutcome> {
    let mut outcome = SelectionOutcome::default();
    for repo in sources {
        let mut taken = Vec::new();
        for id in repo.tree().packages()? {
            if !packages.matches(&id) || !repo.allows(&id) {
                continue;
            }
            if !ledger.claim(id.clone(), kit) {
                debug!(
                    "{}: skipping {} from {}, claimed by {}",
                    kit,
                    id,
                    repo.name,
                    ledger.owner(&id).unwrap_or("?")
                );
                continue;
            }
            taken.push(id);
        }
        if !taken.is_empty() {
            outcome.selections.push(RepoSelection {
                repo: repo.name.clone(),
                packages: taken,
            });
        }
    }
    Ok(outcome)
}

/// Execute Phase 2
pub fn execute(
    ctx: &KitContext,
    collab: &Collaborators,
    ledger: &mut ExclusivityLedger,
) -> Result<SelectionOutcome> {
    let outcome = plan(ctx.name(), &ctx.sources, &ctx.packages, ledger)?;

    let repos = ctx.step_repos();
    let step_ctx = ctx.step_context(&repos, collab, None);
    for selection in &outcome.selections {
        let Some(repo) = ctx.sources.iter().find(|r| r.name == selection.repo) else {
            continue;
        };
        for id in &selection.packages {
            let dest = ctx.tree_root.join(id.rel_path());
            if dest.exists() {
                collab.files.remove_path(&dest)?;
            }
            collab
                .files
                .copy_tree(&repo.root.join(id.rel_path()), &dest, &SyncOptions::default())?;
        }
        info!(
            "{}: {} packages from {}",
            ctx.name(),
            selection.packages.len(),
            repo.name
        );

        // Repository extras travel only with packages actually drawn from it
        if !repo.copyfiles.is_empty() {
            collab
                .files
                .copy_files(&repo.root, &ctx.tree_root, &repo.copyfiles)?;
        }
        if !repo.eclasses.is_empty() {
            let op = InsertEclassesOp {
                repo: repo.name.clone(),
                select: Some(repo.eclasses.clone()),
                offset: None,
            };
            insert_eclasses::apply(&op, &ctx.tree_root, &step_ctx)?;
        }
    }
    Ok(outcome)
}

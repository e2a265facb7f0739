//! Phase 3: Fix-ups
//!
//! Overlays the fix-up repository onto the kit tree. Scopes are applied from
//! the widest to the narrowest, so a later scope overrides an earlier one:
//!
//! ```text
//! kit-fixups/eclass               eclasses for every kit
//! kit-fixups/<kit>/global/...     every branch of <kit>
//! kit-fixups/<kit>/<branch>/...   one branch of <kit>
//! ```
//!
//! A kit scope mirrors a kit tree: `eclass/`, `licenses/`, `profiles/` and
//! package directories. Fix-up packages replace whatever selection placed
//! and are recorded in the ledger without claiming.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{Collaborators, KitContext};
use crate::error::Result;
use crate::filesystem::SyncOptions;
use crate::ledger::ExclusivityLedger;
use crate::package::PackageId;
use crate::tree::{Tree, ECLASS_DIR, LICENSE_DIR, PROFILES_DIR};

/// Scope name shared by every branch of a kit.
pub const GLOBAL_SCOPE: &str = "global";

/// Readme fragment copied from a scope to the kit root.
pub const README_FRAGMENT: &str = "README.rst";

/// What the fix-up phase placed into the kit.
#[derive(Debug, Clone, Default)]
pub struct FixupOutcome {
    /// Scope directories applied, in order
    pub scopes: Vec<PathBuf>,
    /// Packages replaced or added, with the scope that won
    pub packages: BTreeMap<PackageId, String>,
}

impl FixupOutcome {
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// The kit scopes of `kit` at `branch`, in application order.
pub fn scopes(fixups_root: &Path, kit: &str, branch: &str) -> Vec<(String, PathBuf)> {
    [GLOBAL_SCOPE, branch]
        .into_iter()
        .map(|scope| (scope.to_string(), fixups_root.join(kit).join(scope)))
        .collect()
}

/// Execute Phase 3
pub fn execute(
    ctx: &KitContext,
    collab: &Collaborators,
    ledger: &mut ExclusivityLedger,
) -> Result<FixupOutcome> {
    let mut outcome = FixupOutcome::default();
    let fixups_root = &ctx.fixups.root;
    let files = collab.files;

    let shared_eclasses = fixups_root.join(ECLASS_DIR);
    if shared_eclasses.is_dir() {
        files.copy_tree(&shared_eclasses, &ctx.tree_root.join(ECLASS_DIR), &SyncOptions::default())?;
        outcome.scopes.push(shared_eclasses);
    }

    for (scope, dir) in scopes(fixups_root, ctx.name(), &ctx.kit.branch) {
        if !dir.is_dir() {
            debug!("{}: no fix-up scope {}", ctx.name(), scope);
            continue;
        }
        apply_scope(ctx, collab, &scope, &dir, ledger, &mut outcome)?;
        outcome.scopes.push(dir);
    }

    if !outcome.packages.is_empty() {
        info!(
            "{}: {} packages from {}",
            ctx.name(),
            outcome.packages.len(),
            ctx.fixups.name
        );
    }
    Ok(outcome)
}

fn apply_scope(
    ctx: &KitContext,
    collab: &Collaborators,
    scope: &str,
    dir: &Path,
    ledger: &mut ExclusivityLedger,
    outcome: &mut FixupOutcome,
) -> Result<()> {
    let files = collab.files;
    let tree_root = &ctx.tree_root;

    for sub in [ECLASS_DIR, LICENSE_DIR] {
        let src = dir.join(sub);
        if src.is_dir() {
            files.copy_tree(&src, &tree_root.join(sub), &SyncOptions::default())?;
        }
    }
    let profiles = dir.join(PROFILES_DIR);
    if profiles.is_dir() {
        // The kit's identity comes from its own metadata, never a fix-up
        let options = SyncOptions::exclude(["/repo_name"]);
        files.copy_tree(&profiles, &tree_root.join(PROFILES_DIR), &options)?;
    }

    let source = Tree::new(format!("{}/{}", ctx.fixups.name, scope), dir);
    for id in source.packages()? {
        let dest = tree_root.join(id.rel_path());
        if dest.exists() {
            files.remove_path(&dest)?;
        }
        files.copy_tree(&dir.join(id.rel_path()), &dest, &SyncOptions::default())?;
        ledger.record_fixup(id.clone(), ctx.name());
        outcome.packages.insert(id, scope.to_string());
    }

    let readme = dir.join(README_FRAGMENT);
    if readme.is_file() {
        let mapping = BTreeMap::from([(README_FRAGMENT.to_string(), README_FRAGMENT.to_string())]);
        files.copy_files(dir, tree_root, &mapping)?;
    }
    Ok(())
}

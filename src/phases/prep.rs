//! Phase 1: Prep
//!
//! Brings the destination tree to a clean state on the kit branch, writes the
//! kit's repository metadata and runs its `pre` steps. Packages a `pre` step
//! inserts are claimed in the ledger like selected ones. A kit carrying the
//! complete upstream eclass set gets those eclasses here, before fix-ups, so
//! fix-up eclasses still override them.

use log::{debug, info};

use super::{Collaborators, KitContext, RunMode};
use crate::error::{Error, Result};
use crate::ledger::ExclusivityLedger;
use crate::steps::{
    insert_eclasses, GenerateMetadataOp, Housekeeping, InsertEclassesOp, Insertions, Step,
};

/// Execute Phase 1. Returns the packages inserted by `pre` steps.
pub fn execute(
    ctx: &KitContext,
    collab: &Collaborators,
    mode: &RunMode,
    ledger: &mut ExclusivityLedger,
) -> Result<Insertions> {
    open_tree(ctx, collab, mode)?;

    let repos = ctx.step_repos();
    let step_ctx = ctx.step_context(&repos, collab, Some(ledger));
    let root = ctx.tree_root.as_path();

    Step::from(Housekeeping::CleanTree).apply(root, &step_ctx)?;
    Step::GenerateMetadata {
        generate_metadata: GenerateMetadataOp {
            name: ctx.kit.name.clone(),
            masters: ctx.kit.masters.clone(),
            aliases: ctx.kit.aliases.clone(),
            priority: ctx.kit.priority,
        },
    }
    .apply(root, &step_ctx)?;

    for step in &ctx.kit.pre {
        step.apply(root, &step_ctx)?;
    }

    if ctx.kit.all_eclasses {
        if let Some(primary) = ctx.primary() {
            let op = InsertEclassesOp {
                repo: primary.name.clone(),
                select: None,
                offset: None,
            };
            let copied = insert_eclasses::apply(&op, root, &step_ctx)?;
            info!(
                "{}: carrying all {} eclasses of {}",
                ctx.name(),
                copied.len(),
                primary.name
            );
        }
    }
    Ok(step_ctx.inserted.take())
}

/// Make sure the kit's working tree exists and is on the kit branch.
///
/// In push mode the tree is cloned from (or refreshed against) its remote.
/// Otherwise a missing tree is created as a fresh repository.
fn open_tree(ctx: &KitContext, collab: &Collaborators, mode: &RunMode) -> Result<()> {
    let root = &ctx.tree_root;
    let branch = &ctx.kit.branch;
    if mode.push {
        let url = mode.url.as_deref().ok_or_else(|| Error::Configuration {
            message: format!("no remote known for kit {}", ctx.name()),
            hint: Some("set base_url in the [destinations] section of the settings file".into()),
        })?;
        collab.vcs.ensure_clone(url, root)?;
    } else if !root.join(".git").exists() {
        debug!("{}: creating fresh tree at {}", ctx.name(), root.display());
        collab.vcs.init(root, branch)?;
    }
    collab.vcs.checkout_branch(root, branch)
}

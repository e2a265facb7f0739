//! Phase 6: Finalize
//!
//! Runs the kit's `post` steps, closes eclasses and licenses again over
//! anything they added, confirms the eclass closure and then runs the
//! kit-wide housekeeping every kit gets. Packages a `post` step inserts are
//! claimed in the ledger like selected ones. The metadata cache is
//! generated last, once the tree content is final.

use log::info;

use super::{eclass_closure, license_closure};
use super::{Collaborators, KitContext};
use crate::error::{Error, Result};
use crate::ledger::ExclusivityLedger;
use crate::steps::{Housekeeping, Insertions, Step};

/// Housekeeping run after the `post` steps, in order.
pub const HOUSEKEEPING: [Housekeeping; 6] = [
    Housekeeping::EltSymlinkWorkaround,
    Housekeeping::CreateCategories,
    Housekeeping::ProfileDepFix,
    Housekeeping::Minify,
    Housekeeping::GenUseLocalDesc,
    Housekeeping::GenCache,
];

/// Fail when any referenced eclass is absent. Metadata generation cannot
/// complete on a tree with missing eclasses.
pub fn qa_check(ctx: &KitContext) -> Result<()> {
    let missing = ctx.tree().missing_eclasses()?;
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::Convergence {
        kit: ctx.name().to_string(),
        missing: missing.into_iter().collect(),
        consulted: ctx.primary().map(|p| p.name.clone()).into_iter().collect(),
        iterations: 0,
    })
}

/// Execute Phase 6. Returns the packages inserted by `post` steps.
pub fn execute(
    ctx: &KitContext,
    collab: &Collaborators,
    ledger: &mut ExclusivityLedger,
) -> Result<Insertions> {
    let repos = ctx.step_repos();
    let step_ctx = ctx.step_context(&repos, collab, Some(ledger));
    let root = ctx.tree_root.as_path();
    for step in &ctx.kit.post {
        step.apply(root, &step_ctx)?;
    }
    if !ctx.kit.post.is_empty() {
        eclass_closure::execute(ctx, collab)?;
        license_closure::execute(ctx, collab)?;
    }
    qa_check(ctx)?;

    for kind in HOUSEKEEPING {
        Step::from(kind).apply(root, &step_ctx)?;
    }
    info!("{}: finalized", ctx.name());
    Ok(step_ctx.inserted.take())
}

//! Orchestrator for one kit
//!
//! Runs the six phases against a kit's working tree, moving it through the
//! [`KitState`]s, and commits the result. A failing phase returns its error
//! at once: nothing is committed for that kit.

use log::{debug, info};

use super::fixups::FixupOutcome;
use super::selection::SelectionOutcome;
use super::{phase1, phase2, phase3, phase4, phase5, phase6};
use super::{Collaborators, KitContext, KitState, RunMode};
use crate::error::Result;
use crate::ledger::ExclusivityLedger;

/// What one kit's pipeline produced.
#[derive(Debug, Clone)]
pub struct KitOutcome {
    pub kit: String,
    pub branch: String,
    pub state: KitState,
    pub selection: SelectionOutcome,
    pub fixups: FixupOutcome,
    /// New commit, `None` when the tree did not change
    pub commit: Option<String>,
    /// Head of the kit branch after the run
    pub head: String,
}

/// Audit message listing every repository that contributed to the kit.
///
/// Source repositories come first, then supplemental repositories whose
/// packages a step inserted, then the fix-up repository.
pub fn commit_message(ctx: &KitContext, selection: &SelectionOutcome) -> String {
    let mut message = String::from("updates\n\nmerged:\n\n");
    let contributors = selection.contributors();
    let supplemental = ctx
        .supplemental
        .iter()
        .filter(|repo| !ctx.sources.iter().any(|s| s.name == repo.name));
    let merged = ctx
        .sources
        .iter()
        .chain(supplemental)
        .filter(|repo| contributors.contains(&repo.name.as_str()))
        .chain(std::iter::once(&ctx.fixups));
    for repo in merged {
        message.push_str(&format!("  {}: {}\n", repo.name, repo.commit_id));
    }
    message
}

struct Progress<'a> {
    kit: &'a str,
    state: Option<KitState>,
}

impl Progress<'_> {
    fn reach(&mut self, state: KitState) {
        debug_assert!(self.state.is_none_or(|s| s < state));
        debug!("{}: {}", self.kit, state);
        self.state = Some(state);
    }
}

/// Run every phase for one kit and commit the result.
pub fn execute_kit(
    ctx: &KitContext,
    collab: &Collaborators,
    mode: &RunMode,
    ledger: &mut ExclusivityLedger,
) -> Result<KitOutcome> {
    info!("Generating {} ({})", ctx.name(), ctx.kit.branch);
    let mut progress = Progress {
        kit: ctx.name(),
        state: None,
    };

    // Phase 1: Prep
    let pre_inserted = phase1::execute(ctx, collab, mode, ledger)?;
    progress.reach(KitState::Prepared);

    // Phase 2: Selection
    let mut selection = phase2::execute(ctx, collab, ledger)?;
    selection.add_insertions(pre_inserted);
    progress.reach(KitState::Selected);

    // Phase 3: Fix-ups
    let fixups = phase3::execute(ctx, collab, ledger)?;
    progress.reach(KitState::FixedUp);

    // Phases 4 and 5: Closure
    phase4::execute(ctx, collab)?;
    phase5::execute(ctx, collab)?;
    progress.reach(KitState::ClosureResolved);

    // Phase 6: Finalize
    let post_inserted = phase6::execute(ctx, collab, ledger)?;
    selection.add_insertions(post_inserted);
    progress.reach(KitState::Finalized);

    let message = commit_message(ctx, &selection);
    let commit = collab.vcs.commit(&ctx.tree_root, &message)?;
    match &commit {
        Some(id) => info!("{}: committed {}", ctx.name(), id),
        None => info!("{}: no changes", ctx.name()),
    }
    if mode.push {
        collab.vcs.push(&ctx.tree_root, &mode.remote, &ctx.kit.branch)?;
    }
    let head = collab.vcs.head_commit_id(&ctx.tree_root)?;
    progress.reach(KitState::Committed);

    Ok(KitOutcome {
        kit: ctx.name().to_string(),
        branch: ctx.kit.branch.clone(),
        state: KitState::Committed,
        selection,
        fixups,
        commit,
        head,
    })
}

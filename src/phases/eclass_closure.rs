//! Phase 4: Eclass closure
//!
//! Every eclass inherited by a package of the kit, directly or through other
//! eclasses, must be present in the kit tree. Missing eclasses are copied
//! from the primary upstream only; other repositories contribute eclasses
//! solely through their declared `eclasses` list during selection.
//!
//! Copying an eclass can reveal new references, so resolution runs to a
//! fixpoint. Each [`advance`] copies whatever the upstream can supply and
//! rescans the tree. An iteration that leaves the missing set non-empty and
//! the same size as before counts as a stall; more than
//! [`MAX_STALLED_ITERATIONS`] stalls abort the kit with
//! [`Error::Convergence`].

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use super::{Collaborators, KitContext};
use crate::error::{Error, Result};
use crate::filesystem::FileSync;
use crate::sources::SourceRepo;
use crate::tree::{Tree, ECLASS_DIR};

/// Stalled iterations tolerated before the kit is abandoned. The loop gives
/// up only once this bound is exceeded, so an eclass no repository supplies
/// fails on the 17th [`advance`], not the 16th.
pub const MAX_STALLED_ITERATIONS: u32 = 16;

/// State of the fixpoint loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureState {
    /// Eclasses referenced in the kit but not present in it
    pub missing: BTreeSet<String>,
    pub stall_count: u32,
    pub iterations: u32,
}

impl ClosureState {
    /// Initial state from a scan of the kit tree.
    pub fn scan(tree: &Tree) -> Result<Self> {
        Ok(Self {
            missing: tree.missing_eclasses()?,
            stall_count: 0,
            iterations: 0,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn is_stalled(&self) -> bool {
        self.stall_count > MAX_STALLED_ITERATIONS
    }
}

/// Where missing eclasses may come from.
pub struct Upstream<'a> {
    pub repo: &'a SourceRepo,
    /// Reach filter from the repository's allow-list; `None` allows all
    pub allowed: Option<BTreeSet<String>>,
}

impl<'a> Upstream<'a> {
    pub fn new(repo: &'a SourceRepo) -> Result<Self> {
        Ok(Self {
            repo,
            allowed: repo.allowed_eclasses()?,
        })
    }

    fn supplies(&self, name: &str) -> bool {
        self.allowed.as_ref().is_none_or(|a| a.contains(name)) && self.repo.tree().has_eclass(name)
    }
}

/// One fixpoint step: copy every missing eclass the upstream supplies, then
/// rescan the kit tree.
pub fn advance(
    state: ClosureState,
    tree: &Tree,
    upstream: Option<&Upstream>,
    files: &dyn FileSync,
) -> Result<ClosureState> {
    if let Some(upstream) = upstream {
        let mapping: BTreeMap<String, String> = state
            .missing
            .iter()
            .filter(|name| upstream.supplies(name))
            .map(|name| {
                let rel = format!("{}/{}.eclass", ECLASS_DIR, name);
                (rel.clone(), rel)
            })
            .collect();
        if !mapping.is_empty() {
            debug!(
                "{}: copying {} eclasses from {}",
                tree.name,
                mapping.len(),
                upstream.repo.name
            );
            files.copy_files(&upstream.repo.root, &tree.root, &mapping)?;
        }
    }

    let missing = tree.missing_eclasses()?;
    let stalled = !missing.is_empty() && missing.len() == state.missing.len();
    Ok(ClosureState {
        missing,
        stall_count: state.stall_count + u32::from(stalled),
        iterations: state.iterations + 1,
    })
}

/// Execute Phase 4
pub fn execute(ctx: &KitContext, collab: &Collaborators) -> Result<ClosureState> {
    if ctx.kit.all_eclasses {
        debug!("{}: carries every upstream eclass, closure skipped", ctx.name());
        return Ok(ClosureState::default());
    }

    let tree = ctx.tree();
    let upstream = ctx.primary().map(Upstream::new).transpose()?;
    let mut state = ClosureState::scan(&tree)?;
    while !state.is_resolved() {
        if state.is_stalled() {
            return Err(Error::Convergence {
                kit: ctx.name().to_string(),
                missing: state.missing.into_iter().collect(),
                consulted: upstream.iter().map(|u| u.repo.name.clone()).collect(),
                iterations: state.iterations,
            });
        }
        state = advance(state, &tree, upstream.as_ref(), collab.files)?;
    }
    if state.iterations > 0 {
        info!("{}: eclass closure reached after {} iterations", ctx.name(), state.iterations);
    }
    Ok(state)
}

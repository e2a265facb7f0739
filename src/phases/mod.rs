//! Implementation of the phases of the kit pipeline.
//!
//! ## Overview
//!
//! Every kit goes through the same phases, one kit at a time:
//! 1. Prep - Check out the kit branch, clean the tree, write repository
//!    metadata and run the kit's `pre` steps
//! 2. Selection - Copy packages from the kit source, honouring shadow order,
//!    allow-lists and the exclusivity ledger
//! 3. Fix-ups - Overlay the fix-up repository's global and branch scopes
//! 4. Eclass closure - Copy missing eclasses from the primary upstream until
//!    a fixpoint is reached
//! 5. License closure - Copy missing licenses from any source repository
//! 6. Finalize - `post` steps, closure over what they added, QA check and
//!    kit-wide housekeeping
//!
//! The orchestrator runs the phases in order and commits the result. Each
//! phase depends only on the previous phases and the foundation modules.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::cache::MetadataCache;
use crate::config::KitDef;
use crate::filesystem::FileSync;
use crate::ledger::ExclusivityLedger;
use crate::package::PackageSet;
use crate::repository::VcsOperations;
use crate::sources::SourceRepo;
use crate::steps::StepContext;
use crate::tree::Tree;

// Phase modules
pub mod eclass_closure;
pub mod finalize;
pub mod fixups;
pub mod license_closure;
pub mod orchestrator;
pub mod prep;
pub mod selection;

pub use prep as phase1;
pub use selection as phase2;
pub use fixups as phase3;
pub use eclass_closure as phase4;
pub use license_closure as phase5;
pub use finalize as phase6;

/// Where a kit is in its pipeline. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KitState {
    Prepared,
    Selected,
    FixedUp,
    ClosureResolved,
    Finalized,
    Committed,
}

impl fmt::Display for KitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KitState::Prepared => "prepared",
            KitState::Selected => "selected",
            KitState::FixedUp => "fixed up",
            KitState::ClosureResolved => "closure resolved",
            KitState::Finalized => "finalized",
            KitState::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// The external collaborators every phase may call into.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub vcs: &'a dyn VcsOperations,
    pub files: &'a dyn FileSync,
    pub cache: &'a dyn MetadataCache,
}

/// How destination trees are obtained and published.
#[derive(Debug, Clone, Default)]
pub struct RunMode {
    /// Push commits and clone missing kits from their remotes
    pub push: bool,
    pub remote: String,
    /// Remote URL of this kit, required when pushing a kit not yet cloned
    pub url: Option<String>,
}

/// Everything one kit's pipeline works with.
#[derive(Debug, Clone)]
pub struct KitContext<'a> {
    pub kit: &'a KitDef,
    /// The destination working tree
    pub tree_root: PathBuf,
    /// Kit source repositories, in precedence order
    pub sources: Vec<SourceRepo>,
    pub supplemental: Vec<SourceRepo>,
    pub fixups: SourceRepo,
    pub packages: PackageSet,
    pub cache_dir: PathBuf,
}

impl KitContext<'_> {
    pub fn name(&self) -> &str {
        &self.kit.name
    }

    /// The first repository of the kit source.
    pub fn primary(&self) -> Option<&SourceRepo> {
        self.sources.first()
    }

    pub fn tree(&self) -> Tree {
        Tree::new(self.kit.name.as_str(), self.tree_root.as_path())
    }

    /// Checkout roots of every repository the kit's steps may reference.
    pub fn step_repos(&self) -> BTreeMap<String, PathBuf> {
        self.sources
            .iter()
            .chain(self.supplemental.iter())
            .chain(std::iter::once(&self.fixups))
            .map(|repo| (repo.name.clone(), repo.root.clone()))
            .collect()
    }

    pub fn step_context<'b>(
        &'b self,
        repos: &'b BTreeMap<String, PathBuf>,
        collab: &Collaborators<'b>,
        ledger: Option<&'b mut ExclusivityLedger>,
    ) -> StepContext<'b> {
        StepContext {
            kit: self.name(),
            repos,
            primary: self.primary().map(|p| p.root.as_path()),
            files: collab.files,
            cache: collab.cache,
            cache_dir: self.cache_dir.clone(),
            ledger: ledger.map(RefCell::new),
            inserted: RefCell::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixture builder shared by the phase tests.

    use super::*;
    use crate::cache::mock::RecordingCache;
    use crate::config::{KitDef, Pin};
    use crate::filesystem::LocalFileSync;
    use crate::repository::mock::MockVcs;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    pub fn kit_def(name: &str, branch: &str) -> KitDef {
        serde_yaml::from_str(&format!("{{ name: {}, branch: '{}', source: s }}", name, branch))
            .expect("kit definition")
    }

    pub fn repo(name: &str, root: &Path) -> SourceRepo {
        SourceRepo {
            name: name.to_string(),
            url: root.to_string_lossy().to_string(),
            pin: Pin::Branch("master".into()),
            root: root.to_path_buf(),
            select: None,
            eclasses: Vec::new(),
            copyfiles: BTreeMap::new(),
            commit_id: format!("{}-sha", name),
        }
    }

    /// Temporary directories for a kit tree, a fix-up repository and any
    /// number of source repositories.
    pub struct Workspace {
        pub dir: TempDir,
        pub vcs: MockVcs,
        pub cache: RecordingCache,
    }

    impl Workspace {
        pub fn new() -> Self {
            Self {
                dir: TempDir::new().expect("tempdir"),
                vcs: MockVcs::new(),
                cache: RecordingCache::default(),
            }
        }

        pub fn path(&self, rel: &str) -> std::path::PathBuf {
            let path = self.dir.path().join(rel);
            std::fs::create_dir_all(&path).expect("mkdir");
            path
        }

        pub fn collab(&self) -> Collaborators<'_> {
            Collaborators {
                vcs: &self.vcs,
                files: &LocalFileSync,
                cache: &self.cache,
            }
        }

        pub fn context<'a>(&self, kit: &'a KitDef, sources: &[&str]) -> KitContext<'a> {
            KitContext {
                kit,
                tree_root: self.path("kit"),
                sources: sources.iter().map(|s| repo(s, &self.path(s))).collect(),
                supplemental: Vec::new(),
                fixups: repo("kit-fixups", &self.path("kit-fixups")),
                packages: PackageSet::All,
                cache_dir: self.dir.path().join("edb"),
            }
        }
    }
}

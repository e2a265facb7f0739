//! # Version-Control Collaborator
//!
//! The kit pipeline never shells out to `git` directly. Every checkout,
//! commit and push goes through the [`VcsOperations`] trait so the whole
//! generation can run against mock implementations in tests.
//!
//! [`DefaultVcsOperations`] wraps the functions in [`crate::git`].

use std::path::Path;

use crate::config::Pin;
use crate::error::Result;

/// Trait for version-control operations - allows mocking in tests
pub trait VcsOperations {
    /// Clone `url` into `dir`, or refresh the existing clone there.
    fn ensure_clone(&self, url: &str, dir: &Path) -> Result<()>;

    /// Move the working tree of `dir` to a source pin.
    fn checkout_pin(&self, dir: &Path, pin: &Pin) -> Result<()>;

    /// Check out (creating if needed) the branch of a destination kit.
    fn checkout_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    fn head_commit_id(&self, dir: &Path) -> Result<String>;

    /// Commit every change in `dir`. `None` means there was nothing to commit.
    fn commit(&self, dir: &Path, message: &str) -> Result<Option<String>>;

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Create a brand new repository in `dir` on `branch`.
    fn init(&self, dir: &Path, branch: &str) -> Result<()>;
}

/// The default implementation of `VcsOperations`, which uses the system's
/// `git` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultVcsOperations;

impl VcsOperations for DefaultVcsOperations {
    fn ensure_clone(&self, url: &str, dir: &Path) -> Result<()> {
        crate::git::clone_or_fetch(url, dir)
    }

    fn checkout_pin(&self, dir: &Path, pin: &Pin) -> Result<()> {
        match pin {
            Pin::Branch(branch) => crate::git::checkout_remote_branch(dir, branch),
            Pin::Commit(commit) => crate::git::checkout_commit(dir, commit),
        }
    }

    fn checkout_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        crate::git::checkout_branch(dir, branch)
    }

    fn head_commit_id(&self, dir: &Path) -> Result<String> {
        crate::git::head_commit_id(dir)
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<Option<String>> {
        crate::git::commit_all(dir, message)
    }

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        crate::git::push(dir, remote, branch)
    }

    fn init(&self, dir: &Path, branch: &str) -> Result<()> {
        crate::git::init(dir, branch)
    }
}

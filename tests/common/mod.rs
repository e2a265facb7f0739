//! Shared test utilities for integration and E2E tests.
//!
//! This module provides fixture repositories, definition snippets and a
//! recording version-control collaborator for driving whole generation runs.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = TestFixture::new().with_definitions(configs::MINIMAL);
//! fixture.ebuild("upstream", "a/x", &["m1"], "GPL-2");
//! ```

#![allow(dead_code)]

use assert_fs::prelude::*;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use kit_merge::cache::MetadataCache;
use kit_merge::config::Pin;
use kit_merge::error::Result;
use kit_merge::filesystem::{FileSync, LocalFileSync, SyncOptions};
use kit_merge::repository::VcsOperations;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    pub use super::configs;
    pub use super::{LocalVcs, NoCache, TestFixture};
}

/// Generation definition snippets. `@ROOT@` is replaced with the fixture
/// directory by [`TestFixture::with_definitions`].
pub mod configs {
    /// One upstream, one kit.
    pub const MINIMAL: &str = r#"
repositories:
  upstream: { url: "@ROOT@/remote/upstream" }
kit_sources:
  main:
    - { repo: upstream, branch: master }
fixups: { url: "@ROOT@/remote/kit-fixups" }
groups:
  base:
    - { name: a-kit, branch: master, source: main, packages: ["a/*"] }
order: [base]
"#;

    /// Two repositories shadowing each other, two scopes and a catch-all.
    pub const SCOPED: &str = r#"
repositories:
  upstream: { url: "@ROOT@/remote/upstream" }
  overlay: { url: "@ROOT@/remote/overlay" }
kit_sources:
  main:
    - { repo: upstream, branch: master }
    - { repo: overlay, branch: master }
fixups: { url: "@ROOT@/remote/kit-fixups" }
groups:
  prime:
    - { name: kit1, branch: "1.0", source: main, packages: ["a/x"] }
    - { name: kit2, branch: "1.0", source: main, packages: ["a/*"] }
  current:
    - { name: b-kit, branch: "1.0", source: main, packages: ["b/*"] }
    - { name: kit-catchall, branch: master, source: main, catch_all: true }
order: [prime, reset, current]
"#;

    /// A later kit whose `post` step reaches into packages of an earlier
    /// kit of the same scope.
    pub const POST_INSERT: &str = r#"
repositories:
  upstream: { url: "@ROOT@/remote/upstream" }
kit_sources:
  main:
    - { repo: upstream, branch: master }
fixups: { url: "@ROOT@/remote/kit-fixups" }
groups:
  base:
    - { name: kit1, branch: master, source: main, packages: ["a/*"] }
    - name: kit2
      branch: master
      source: main
      packages: ["b/*"]
      post:
        - insert_packages: { repo: upstream, select: ["a/x", "c/z"] }
order: [base]
"#;

    pub const INVALID_YAML: &str = "repositories: [unclosed";
}

/// A temporary directory holding fixture repositories, definitions and
/// work directories.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `kits.yaml` with `@ROOT@` expanded.
    pub fn with_definitions(self, content: &str) -> Self {
        let root = self.path().to_string_lossy().to_string();
        self.temp_dir
            .child("kits.yaml")
            .write_str(&content.replace("@ROOT@", &root))
            .expect("Failed to write definitions");
        for dir in ["remote/upstream", "remote/overlay", "remote/kit-fixups"] {
            fs::create_dir_all(self.path().join(dir)).expect("Failed to create remote");
        }
        self
    }

    /// Write a settings file pointing every work directory into the fixture.
    pub fn with_settings(self, extra: &str) -> Self {
        let root = self.path().display();
        let content = format!(
            "[work]\nsource = {root}/work/src\ndestination = {root}/work/dest\ncache = {root}/work/edb\n{extra}"
        );
        self.temp_dir
            .child("merge.ini")
            .write_str(&content)
            .expect("Failed to write settings");
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("kits.yaml")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.path().join("merge.ini")
    }

    pub fn remote(&self, repo: &str) -> PathBuf {
        self.path().join("remote").join(repo)
    }

    pub fn kit_tree(&self, kit: &str) -> PathBuf {
        self.path().join("work/dest").join(kit)
    }

    /// Write `<repo>/<id>/<pkg>-1.0.ebuild` under `remote/`.
    pub fn ebuild(&self, repo: &str, id: &str, inherits: &[&str], license: &str) {
        self.ebuild_at(&self.remote(repo), id, inherits, license);
    }

    pub fn ebuild_at(&self, root: &Path, id: &str, inherits: &[&str], license: &str) {
        let (cat, pkg) = id.split_once('/').expect("category/name");
        let dir = root.join(cat).join(pkg);
        fs::create_dir_all(&dir).expect("mkdir");
        let mut body = String::from("EAPI=6\n");
        if !inherits.is_empty() {
            body.push_str(&format!("inherit {}\n", inherits.join(" ")));
        }
        if !license.is_empty() {
            body.push_str(&format!("LICENSE=\"{}\"\n", license));
        }
        body.push_str(&format!("# from {}\n", root.display()));
        fs::write(dir.join(format!("{}-1.0.ebuild", pkg)), body).expect("write ebuild");
    }

    pub fn eclass(&self, repo: &str, name: &str, inherits: &[&str], marker: &str) {
        let dir = self.remote(repo).join("eclass");
        fs::create_dir_all(&dir).expect("mkdir");
        let mut body = format!("# {}\n", marker);
        if !inherits.is_empty() {
            body.push_str(&format!("inherit {}\n", inherits.join(" ")));
        }
        fs::write(dir.join(format!("{}.eclass", name)), body).expect("write eclass");
    }

    pub fn license(&self, repo: &str, name: &str) {
        let dir = self.remote(repo).join("licenses");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(name), name).expect("write license");
    }

    /// Turn every fixture repository under `remote/` into a git repository
    /// with one commit on `master`.
    pub fn commit_remotes(&self) {
        for entry in fs::read_dir(self.path().join("remote")).expect("read remotes") {
            let dir = entry.expect("entry").path();
            fs::write(dir.join("README"), "fixture\n").expect("write README");
            git(&dir, &["init", "-q"]);
            git(&dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
            git(&dir, &["add", "--all"]);
            git(&dir, &["commit", "-q", "-m", "fixture"]);
        }
    }

    /// Create a command for the kit-merge binary running in the fixture.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kit-merge");
        cmd.current_dir(self.path());
        cmd.env_remove("KIT_MERGE_SETTINGS");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=Fixture", "-c", "user.email=fixture@example.org"])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git runs");
    assert!(status.success(), "git {:?} failed in {}", args, dir.display());
}

/// Version control over plain directories: clones copy the URL directory,
/// commits are numbered and recorded.
#[derive(Default)]
pub struct LocalVcs {
    pub commits: RefCell<Vec<(PathBuf, String)>>,
    pub pushes: RefCell<Vec<(PathBuf, String)>>,
}

impl VcsOperations for LocalVcs {
    fn ensure_clone(&self, url: &str, dir: &Path) -> Result<()> {
        LocalFileSync.copy_tree(Path::new(url), dir, &SyncOptions::default())
    }

    fn checkout_pin(&self, _dir: &Path, _pin: &Pin) -> Result<()> {
        Ok(())
    }

    fn checkout_branch(&self, _dir: &Path, _branch: &str) -> Result<()> {
        Ok(())
    }

    fn head_commit_id(&self, dir: &Path) -> Result<String> {
        Ok(format!(
            "{}-head",
            dir.file_name().unwrap_or_default().to_string_lossy()
        ))
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<Option<String>> {
        let mut commits = self.commits.borrow_mut();
        commits.push((dir.to_path_buf(), message.to_string()));
        Ok(Some(format!("commit-{}", commits.len())))
    }

    fn push(&self, dir: &Path, _remote: &str, branch: &str) -> Result<()> {
        self.pushes
            .borrow_mut()
            .push((dir.to_path_buf(), branch.to_string()));
        Ok(())
    }

    fn init(&self, dir: &Path, _branch: &str) -> Result<()> {
        fs::create_dir_all(dir)?;
        Ok(())
    }
}

/// Metadata cache that does nothing.
pub struct NoCache;

impl MetadataCache for NoCache {
    fn generate_cache(&self, _tree_root: &Path, _cache_dir: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_expands_root() {
        let fixture = TestFixture::new().with_definitions(configs::MINIMAL);
        let text = fs::read_to_string(fixture.config_path()).unwrap();
        assert!(!text.contains("@ROOT@"));
        assert!(fixture.remote("upstream").is_dir());
    }

    #[test]
    fn test_configs_are_valid_yaml() {
        for config in [configs::MINIMAL, configs::SCOPED] {
            serde_yaml::from_str::<serde_yaml::Value>(config).expect("Config should be valid YAML");
        }
    }

    #[test]
    fn test_invalid_yaml_is_actually_invalid() {
        let result = serde_yaml::from_str::<serde_yaml::Value>(configs::INVALID_YAML);
        assert!(result.is_err(), "INVALID_YAML should not parse");
    }
}

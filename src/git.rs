//! Thin wrappers around the system `git` binary.
//!
//! Using the `git` executable means SSH keys, credential helpers and any
//! authentication configured in `~/.gitconfig` work without extra setup.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{Error, Result};

/// Run `git <args>` inside `dir` and return trimmed stdout.
fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    run_git_with_input(dir, args, None)
}

fn run_git_with_input(dir: &Path, args: &[&str], input: Option<&str>) -> Result<String> {
    debug!("git {} (in {})", args.join(" "), dir.display());
    let operation = format!("git {}", args.first().copied().unwrap_or_default());
    let mut child = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::external(&operation, dir.display(), e.to_string()))?;

    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| Error::external(&operation, dir.display(), e.to_string()))?;
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Error::external(&operation, dir.display(), e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.contains("Authentication failed")
            || stderr.contains("Permission denied")
            || stderr.contains("Could not read from remote repository")
        {
            format!(
                "Authentication failed. Make sure you have access to the repository \
                 (SSH key in ssh-agent, credential helper or access token). Error: {}",
                stderr.trim()
            )
        } else {
            stderr.trim().to_string()
        };
        return Err(Error::external(operation, dir.display(), message));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Clone `url` into `target_dir`, or fetch if a clone already exists there.
pub fn clone_or_fetch(url: &str, target_dir: &Path) -> Result<()> {
    if target_dir.join(".git").exists() {
        run_git(target_dir, &["fetch", "--quiet", "--prune", "origin"])?;
        return Ok(());
    }

    if target_dir.exists() {
        fs::remove_dir_all(target_dir)?;
    }
    let parent = target_dir.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let target = target_dir.to_string_lossy();
    run_git(parent, &["clone", "--quiet", url, &target])?;
    Ok(())
}

/// Force the working tree to `origin/<branch>`.
pub fn checkout_remote_branch(dir: &Path, branch: &str) -> Result<()> {
    let upstream = format!("origin/{}", branch);
    run_git(dir, &["checkout", "--quiet", "--force", "-B", branch, &upstream])?;
    Ok(())
}

/// Detach the working tree at an immutable commit id.
pub fn checkout_commit(dir: &Path, commit: &str) -> Result<()> {
    run_git(dir, &["checkout", "--quiet", "--force", "--detach", commit])?;
    Ok(())
}

fn has_ref(dir: &Path, reference: &str) -> bool {
    run_git(dir, &["rev-parse", "--verify", "--quiet", reference]).is_ok()
}

/// Check out a kit branch, creating it when neither a local nor a remote
/// branch of that name exists.
pub fn checkout_branch(dir: &Path, branch: &str) -> Result<()> {
    let local = format!("refs/heads/{}", branch);
    let remote = format!("refs/remotes/origin/{}", branch);
    if has_ref(dir, &local) {
        run_git(dir, &["checkout", "--quiet", branch])?;
    } else if has_ref(dir, &remote) {
        let upstream = format!("origin/{}", branch);
        run_git(dir, &["checkout", "--quiet", "-b", branch, &upstream])?;
    } else {
        run_git(dir, &["checkout", "--quiet", "-b", branch])?;
    }
    Ok(())
}

pub fn head_commit_id(dir: &Path) -> Result<String> {
    run_git(dir, &["rev-parse", "HEAD"])
}

/// Stage everything and commit. Returns `None` when the tree is unchanged.
pub fn commit_all(dir: &Path, message: &str) -> Result<Option<String>> {
    run_git(dir, &["add", "--all", "."])?;
    if run_git(dir, &["status", "--porcelain"])?.is_empty() {
        return Ok(None);
    }
    run_git_with_input(dir, &["commit", "--quiet", "-F", "-"], Some(message))?;
    head_commit_id(dir).map(Some)
}

pub fn push(dir: &Path, remote: &str, branch: &str) -> Result<()> {
    run_git(dir, &["push", "--quiet", remote, branch])?;
    Ok(())
}

/// Create a fresh repository with an initial commit on `branch`.
pub fn init(dir: &Path, branch: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    run_git(dir, &["init", "--quiet"])?;
    let head = format!("refs/heads/{}", branch);
    run_git(dir, &["symbolic-ref", "HEAD", &head])?;
    fs::write(dir.join("README"), "")?;
    run_git(dir, &["add", "README"])?;
    run_git(dir, &["commit", "--quiet", "-m", "first commit"])?;
    Ok(())
}

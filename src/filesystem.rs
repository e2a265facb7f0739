//! # File Synchronization
//!
//! Bulk file movement between repository checkouts and kit working trees.
//! Everything goes through the [`FileSync`] trait so the pipeline can be
//! exercised against real temporary directories in tests and so an rsync
//! backed implementation could replace [`LocalFileSync`] without touching
//! the pipeline.
//!
//! Each call is all-or-nothing from the caller's perspective: any failure is
//! reported as [`Error::ExternalOperation`] and aborts the run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path::{compile_excludes, is_excluded};

/// Options for [`FileSync::copy_tree`].
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// rsync-style exclude patterns (`/anchored`, or floating)
    pub exclude: Vec<String>,
    /// Remove destination entries that do not exist in the source
    pub delete: bool,
}

impl SyncOptions {
    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: patterns.into_iter().map(Into::into).collect(),
            delete: false,
        }
    }

    pub fn with_delete(mut self) -> Self {
        self.delete = true;
        self
    }
}

/// The file-sync collaborator interface.
pub trait FileSync {
    /// Recursively copy `src` onto `dst`. `.git` is never copied.
    fn copy_tree(&self, src: &Path, dst: &Path, options: &SyncOptions) -> Result<()>;

    /// Copy individual files: each `from` (relative to `src_root`) is written
    /// to `to` (relative to `dst_root`).
    fn copy_files(
        &self,
        src_root: &Path,
        dst_root: &Path,
        mapping: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Copy every file directly inside `src_dir` into `dst_dir`, naming each
    /// copy by `transform(file_name)`. Files for which it returns `None` are
    /// skipped.
    fn rename_matching(
        &self,
        src_dir: &Path,
        dst_dir: &Path,
        transform: &dyn Fn(&str) -> Option<String>,
    ) -> Result<()>;

    /// Remove a file or directory tree if it exists.
    fn remove_path(&self, path: &Path) -> Result<()>;
}

/// [`FileSync`] on the local filesystem, with rsync `-a` like semantics.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSync;

fn io_failure(operation: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::external(operation, path.display(), e.to_string())
}

fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src).map_err(|e| io_failure("stat", src, e))?;
    if let Ok(existing) = fs::symlink_metadata(dst) {
        let type_changed = existing.is_dir() != meta.is_dir()
            || existing.file_type().is_symlink() != meta.file_type().is_symlink();
        if type_changed || meta.file_type().is_symlink() {
            LocalFileSync.remove_path(dst)?;
        }
    }
    if meta.is_dir() {
        fs::create_dir_all(dst).map_err(|e| io_failure("mkdir", dst, e))?;
        return Ok(());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| io_failure("mkdir", parent, e))?;
    }
    #[cfg(unix)]
    if meta.file_type().is_symlink() {
        let target = fs::read_link(src).map_err(|e| io_failure("readlink", src, e))?;
        std::os::unix::fs::symlink(&target, dst).map_err(|e| io_failure("symlink", dst, e))?;
        return Ok(());
    }
    fs::copy(src, dst).map_err(|e| io_failure("copy", src, e))?;
    Ok(())
}

impl FileSync for LocalFileSync {
    fn copy_tree(&self, src: &Path, dst: &Path, options: &SyncOptions) -> Result<()> {
        if !src.is_dir() {
            return Err(Error::external(
                "copy tree",
                src.display(),
                "source directory does not exist",
            ));
        }
        let (patterns, anchored) = compile_excludes(&options.exclude)?;
        let skip = |rel: &Path| {
            rel.components().next().is_some_and(|c| c.as_os_str() == ".git")
                || is_excluded(&patterns, &anchored, rel)
        };

        fs::create_dir_all(dst).map_err(|e| io_failure("mkdir", dst, e))?;

        let mut copied = 0usize;
        let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|entry| {
            entry
                .path()
                .strip_prefix(src)
                .map(|rel| !skip(rel))
                .unwrap_or(false)
        });
        for entry in walker {
            let entry = entry.map_err(|e| io_failure("walk", src, e))?;
            let rel = entry.path().strip_prefix(src).map_err(|e| io_failure("walk", src, e))?;
            copy_entry(entry.path(), &dst.join(rel))?;
            copied += 1;
        }

        if options.delete {
            let mut doomed: Vec<PathBuf> = Vec::new();
            let walker = WalkDir::new(dst).min_depth(1).into_iter().filter_entry(|entry| {
                let rel = match entry.path().strip_prefix(dst) {
                    Ok(rel) => rel,
                    Err(_) => return false,
                };
                if skip(rel) {
                    return false;
                }
                if fs::symlink_metadata(src.join(rel)).is_err() {
                    doomed.push(entry.path().to_path_buf());
                    return false;
                }
                true
            });
            for entry in walker {
                entry.map_err(|e| io_failure("walk", dst, e))?;
            }
            for path in &doomed {
                self.remove_path(path)?;
            }
        }

        debug!("synced {} entries from {} to {}", copied, src.display(), dst.display());
        Ok(())
    }

    fn copy_files(
        &self,
        src_root: &Path,
        dst_root: &Path,
        mapping: &BTreeMap<String, String>,
    ) -> Result<()> {
        for (from, to) in mapping {
            let src = src_root.join(from);
            if !src.exists() {
                return Err(Error::external("copy file", src.display(), "source file does not exist"));
            }
            let dst = dst_root.join(to);
            if src.is_dir() {
                self.copy_tree(&src, &dst, &SyncOptions::default())?;
            } else {
                copy_entry(&src, &dst)?;
            }
        }
        Ok(())
    }

    fn rename_matching(
        &self,
        src_dir: &Path,
        dst_dir: &Path,
        transform: &dyn Fn(&str) -> Option<String>,
    ) -> Result<()> {
        let entries = fs::read_dir(src_dir).map_err(|e| io_failure("read dir", src_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_failure("read dir", src_dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(new_name) = transform(&name) {
                copy_entry(&entry.path(), &dst_dir.join(new_name))?;
            }
        }
        Ok(())
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => return Ok(()),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path).map_err(|e| io_failure("remove", path, e))
        } else {
            fs::remove_file(path).map_err(|e| io_failure("remove", path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_copy_tree_with_excludes() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "profiles/repo_name", "gentoo");
        write(src.path(), "profiles/package.mask", "=a/b-1");
        write(src.path(), "metadata/cache/a/b-1", "cache");
        write(src.path(), ".git/HEAD", "ref");

        let options = SyncOptions::exclude(["repo_name", "/metadata/cache"]);
        LocalFileSync.copy_tree(src.path(), dst.path(), &options).unwrap();

        assert!(dst.path().join("profiles/package.mask").is_file());
        assert!(!dst.path().join("profiles/repo_name").exists());
        assert!(!dst.path().join("metadata/cache").exists());
        assert!(!dst.path().join(".git").exists());
    }

    #[test]
    fn test_copy_tree_delete_removes_extras_but_keeps_git() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "a/x/x-1.ebuild", "new");
        write(dst.path(), "a/x/x-0.ebuild", "old");
        write(dst.path(), "stale/dir/file", "old");
        write(dst.path(), ".git/HEAD", "ref");

        LocalFileSync
            .copy_tree(src.path(), dst.path(), &SyncOptions::default().with_delete())
            .unwrap();

        assert!(dst.path().join("a/x/x-1.ebuild").is_file());
        assert!(!dst.path().join("a/x/x-0.ebuild").exists());
        assert!(!dst.path().join("stale").exists());
        assert!(dst.path().join(".git/HEAD").exists());
    }

    #[test]
    fn test_copy_tree_missing_source_is_external_error() {
        let dst = TempDir::new().unwrap();
        let err = LocalFileSync
            .copy_tree(Path::new("/nonexistent/src"), dst.path(), &SyncOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::ExternalOperation { .. }));
    }

    #[test]
    fn test_copy_files_mapping() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "profiles/package.mask", "=x/y-1");
        let mut mapping = BTreeMap::new();
        mapping.insert(
            "profiles/package.mask".to_string(),
            "profiles/package.mask/deadbeef.mask".to_string(),
        );
        LocalFileSync.copy_files(src.path(), dst.path(), &mapping).unwrap();
        let copied = fs::read_to_string(dst.path().join("profiles/package.mask/deadbeef.mask")).unwrap();
        assert_eq!(copied, "=x/y-1");
    }

    #[test]
    fn test_copy_files_missing_source_fails() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let mut mapping = BTreeMap::new();
        mapping.insert("nope".to_string(), "nope".to_string());
        assert!(LocalFileSync.copy_files(src.path(), dst.path(), &mapping).is_err());
    }

    #[test]
    fn test_rename_matching() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "subarch/amd64", "a");
        write(src.path(), "subarch/core2", "c");
        LocalFileSync
            .rename_matching(&src.path().join("subarch"), &dst.path().join("out"), &|name: &str| {
                (name != "core2").then(|| format!("{}-pure64", name))
            })
            .unwrap();
        assert!(dst.path().join("out/amd64-pure64").is_file());
        assert!(!dst.path().join("out/core2-pure64").exists());
    }

    #[test]
    fn test_copy_overwrites_existing_file() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "eclass/m1.eclass", "upstream");
        write(dst.path(), "eclass/m1.eclass", "stale");
        LocalFileSync
            .copy_tree(src.path(), dst.path(), &SyncOptions::default())
            .unwrap();
        assert_eq!(fs::read_to_string(dst.path().join("eclass/m1.eclass")).unwrap(), "upstream");
    }
}

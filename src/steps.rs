//! Tree operations applied to a kit's working tree.
//!
//! Kits list `pre` and `post` steps in their definitions; the pipeline
//! itself also uses these operations for selection, fix-ups, closure and
//! finalize. The set of operations is closed: every variant of [`Step`] is
//! implemented in one of the submodules below, each exposing an `apply`
//! function against a tree root and a [`StepContext`].
//!
//! In YAML a step is either a single-key mapping naming the operation or,
//! for parameterless housekeeping steps, a bare string:
//!
//! ```yaml
//! pre:
//!   - sync_dir: { repo: gentoo-staging, src: profiles, exclude: [repo_name] }
//!   - run_sed: { files: [profiles/base/make.defaults], expressions: ["/^PYTHON_TARGETS=/d"] }
//!   - profile_dep_fix
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::MetadataCache;
use crate::error::{Error, Result};
use crate::filesystem::{FileSync, SyncOptions};
use crate::ledger::ExclusivityLedger;
use crate::package::{PackageId, PackageSet};
use crate::tree::{Tree, ECLASS_DIR, LICENSE_DIR, PROFILES_DIR};

/// Everything a step may need besides the tree it modifies.
pub struct StepContext<'a> {
    /// Kit being built
    pub kit: &'a str,
    /// Checkout roots of the repositories steps may reference, by name
    pub repos: &'a BTreeMap<String, PathBuf>,
    /// Checkout root of the kit's primary upstream
    pub primary: Option<&'a Path>,
    pub files: &'a dyn FileSync,
    pub cache: &'a dyn MetadataCache,
    /// Metadata cache directory for this kit and branch
    pub cache_dir: PathBuf,
    /// Ledger of the current scope. When present, package insertions skip
    /// packages owned by another kit or supplied by a fix-up, and claim the
    /// rest for this kit.
    pub ledger: Option<RefCell<&'a mut ExclusivityLedger>>,
    /// Packages inserted so far
    pub inserted: RefCell<Insertions>,
}

/// Packages placed into a kit by its steps, by source repository.
pub type Insertions = BTreeMap<String, Vec<PackageId>>;

impl StepContext<'_> {
    fn repo_root(&self, step: &str, name: &str) -> Result<&Path> {
        self.repos
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::Step {
                step: step.to_string(),
                message: format!("repository {} is not available to kit {}", name, self.kit),
            })
    }
}

/// Mirror a directory of a repository into the tree.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SyncDirOp {
    pub repo: String,
    /// Directory inside the repository; the repository root when absent
    #[serde(default)]
    pub src: Option<String>,
    /// Directory inside the tree; defaults to `src`
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SyncFilesOp {
    pub repo: String,
    /// Source path in the repository to destination path in the tree
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InsertPackagesOp {
    pub repo: String,
    /// Package patterns; every package when empty
    #[serde(default)]
    pub select: Vec<String>,
    /// Replace packages already in the tree
    #[serde(default = "default_true")]
    pub replace: bool,
    /// Subdirectory of the repository holding the package tree
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InsertEclassesOp {
    pub repo: String,
    /// Eclass names; every eclass when absent
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InsertLicensesOp {
    pub repo: String,
    /// License names; every license when absent
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GenerateMetadataOp {
    pub name: String,
    #[serde(default)]
    pub masters: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunSedOp {
    /// Files relative to the tree root
    pub files: Vec<String>,
    /// `/re/d` and `s/re/replacement/[g]` expressions
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CopyAndRenameOp {
    pub src: String,
    pub dest: String,
    /// Regex matched against each file name
    pub from: String,
    /// Replacement, `$1` style captures allowed
    pub to: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AutoGlobMaskOp {
    pub package: PackageId,
    /// Glob matched against `<name>-<version>` of each ebuild
    pub glob: String,
    /// File name under `profiles/package.mask/`
    pub file: String,
}

fn default_true() -> bool {
    true
}

/// Parameterless kit-wide housekeeping.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Housekeeping {
    /// Drop `deprecated` markers of profiles listed in `profiles.desc`
    ProfileDepFix,
    /// Delete ChangeLogs and reduce Manifests to `DIST` lines
    Minify,
    /// Write `profiles/categories` from the categories present
    CreateCategories,
    /// Write `profiles/use.local.desc` from `metadata.xml`
    GenUseLocalDesc,
    /// Regenerate the metadata cache
    GenCache,
    /// Remove everything but `.git`
    CleanTree,
    /// Materialise `eclass/ELT-patches` from the primary upstream
    EltSymlinkWorkaround,
}

/// One tree operation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Step {
    SyncDir { sync_dir: SyncDirOp },
    SyncFiles { sync_files: SyncFilesOp },
    InsertPackages { insert_packages: InsertPackagesOp },
    InsertEclasses { insert_eclasses: InsertEclassesOp },
    InsertLicenses { insert_licenses: InsertLicensesOp },
    GenerateMetadata { generate_metadata: GenerateMetadataOp },
    RunSed { run_sed: RunSedOp },
    CopyAndRename { copy_and_rename: CopyAndRenameOp },
    AutoGlobMask { auto_glob_mask: AutoGlobMaskOp },
    Housekeeping(Housekeeping),
}

impl From<Housekeeping> for Step {
    fn from(value: Housekeeping) -> Self {
        Step::Housekeeping(value)
    }
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::SyncDir { .. } => "sync_dir",
            Step::SyncFiles { .. } => "sync_files",
            Step::InsertPackages { .. } => "insert_packages",
            Step::InsertEclasses { .. } => "insert_eclasses",
            Step::InsertLicenses { .. } => "insert_licenses",
            Step::GenerateMetadata { .. } => "generate_metadata",
            Step::RunSed { .. } => "run_sed",
            Step::CopyAndRename { .. } => "copy_and_rename",
            Step::AutoGlobMask { .. } => "auto_glob_mask",
            Step::Housekeeping(Housekeeping::ProfileDepFix) => "profile_dep_fix",
            Step::Housekeeping(Housekeeping::Minify) => "minify",
            Step::Housekeeping(Housekeeping::CreateCategories) => "create_categories",
            Step::Housekeeping(Housekeeping::GenUseLocalDesc) => "gen_use_local_desc",
            Step::Housekeeping(Housekeeping::GenCache) => "gen_cache",
            Step::Housekeeping(Housekeeping::CleanTree) => "clean_tree",
            Step::Housekeeping(Housekeeping::EltSymlinkWorkaround) => "elt_symlink_workaround",
        }
    }

    /// Repository this step reads from, if any.
    pub fn repository(&self) -> Option<&str> {
        match self {
            Step::SyncDir { sync_dir } => Some(&sync_dir.repo),
            Step::SyncFiles { sync_files } => Some(&sync_files.repo),
            Step::InsertPackages { insert_packages } => Some(&insert_packages.repo),
            Step::InsertEclasses { insert_eclasses } => Some(&insert_eclasses.repo),
            Step::InsertLicenses { insert_licenses } => Some(&insert_licenses.repo),
            _ => None,
        }
    }

    /// Apply this step to the tree rooted at `tree_root`.
    pub fn apply(&self, tree_root: &Path, ctx: &StepContext) -> Result<()> {
        log::debug!("{}: {}", ctx.kit, self.name());
        match self {
            Step::SyncDir { sync_dir } => sync_dir::apply(sync_dir, tree_root, ctx),
            Step::SyncFiles { sync_files } => sync_files::apply(sync_files, tree_root, ctx),
            Step::InsertPackages { insert_packages } => {
                insert_packages::apply(insert_packages, tree_root, ctx).map(|_| ())
            }
            Step::InsertEclasses { insert_eclasses } => {
                insert_eclasses::apply(insert_eclasses, tree_root, ctx).map(|_| ())
            }
            Step::InsertLicenses { insert_licenses } => {
                insert_licenses::apply(insert_licenses, tree_root, ctx).map(|_| ())
            }
            Step::GenerateMetadata { generate_metadata } => {
                generate_metadata::apply(generate_metadata, tree_root)
            }
            Step::RunSed { run_sed } => run_sed::apply(run_sed, tree_root),
            Step::CopyAndRename { copy_and_rename } => {
                copy_and_rename::apply(copy_and_rename, tree_root, ctx)
            }
            Step::AutoGlobMask { auto_glob_mask } => auto_glob_mask::apply(auto_glob_mask, tree_root),
            Step::Housekeeping(kind) => housekeeping::apply(*kind, tree_root, ctx),
        }
    }
}

fn step_error(step: &str, message: impl Into<String>) -> Error {
    Error::Step {
        step: step.to_string(),
        message: message.into(),
    }
}

fn offset_root(root: &Path, offset: &Option<String>) -> PathBuf {
    match offset {
        Some(offset) => root.join(offset),
        None => root.to_path_buf(),
    }
}

/// Mirror a repository directory into the tree
pub mod sync_dir {
    use super::*;

    pub fn apply(op: &SyncDirOp, tree_root: &Path, ctx: &StepContext) -> Result<()> {
        let repo_root = ctx.repo_root("sync_dir", &op.repo)?;
        let src = offset_root(repo_root, &op.src);
        let dest = match op.dest.as_ref().or(op.src.as_ref()) {
            Some(dest) => tree_root.join(dest),
            None => tree_root.to_path_buf(),
        };
        let mut options = SyncOptions::exclude(op.exclude.iter().cloned());
        options.delete = op.delete;
        ctx.files.copy_tree(&src, &dest, &options)
    }
}

/// Copy individual files from a repository
pub mod sync_files {
    use super::*;

    pub fn apply(op: &SyncFilesOp, tree_root: &Path, ctx: &StepContext) -> Result<()> {
        let repo_root = ctx.repo_root("sync_files", &op.repo)?;
        ctx.files.copy_files(repo_root, tree_root, &op.files)
    }
}

/// Copy whole package directories from a repository
pub mod insert_packages {
    use super::*;

    /// Returns the packages written into the tree.
    pub fn apply(op: &InsertPackagesOp, tree_root: &Path, ctx: &StepContext) -> Result<Vec<PackageId>> {
        let root = offset_root(ctx.repo_root("insert_packages", &op.repo)?, &op.offset);
        let source = Tree::new(op.repo.as_str(), root);
        let wanted = if op.select.is_empty() {
            PackageSet::All
        } else {
            PackageSet::from_patterns(&op.select)?
        };

        let mut inserted = Vec::new();
        for id in source.packages()? {
            if !wanted.matches(&id) || !admitted(&id, ctx) {
                continue;
            }
            let dest = tree_root.join(id.rel_path());
            if dest.exists() {
                if !op.replace {
                    continue;
                }
                ctx.files.remove_path(&dest)?;
            }
            ctx.files
                .copy_tree(&source.root.join(id.rel_path()), &dest, &SyncOptions::default())?;
            if let Some(ledger) = &ctx.ledger {
                ledger.borrow_mut().claim(id.clone(), ctx.kit);
            }
            inserted.push(id);
        }

        if !inserted.is_empty() {
            ctx.inserted
                .borrow_mut()
                .entry(op.repo.clone())
                .or_default()
                .extend(inserted.iter().cloned());
        }
        Ok(inserted)
    }

    fn admitted(id: &PackageId, ctx: &StepContext) -> bool {
        let Some(ledger) = &ctx.ledger else {
            return true;
        };
        let ledger = ledger.borrow();
        if ledger.is_fixup(id, ctx.kit) {
            log::debug!("{}: {} comes from fix-ups, not inserting", ctx.kit, id);
            return false;
        }
        match ledger.owner(id) {
            Some(owner) if owner != ctx.kit => {
                log::debug!("{}: {} already claimed by {}", ctx.kit, id, owner);
                false
            }
            _ => true,
        }
    }
}

/// Copy eclasses from a repository
pub mod insert_eclasses {
    use super::*;

    /// Returns the names of the eclasses copied. Selected eclasses the
    /// repository does not have are skipped.
    pub fn apply(op: &InsertEclassesOp, tree_root: &Path, ctx: &StepContext) -> Result<Vec<String>> {
        let root = offset_root(ctx.repo_root("insert_eclasses", &op.repo)?, &op.offset);
        let source = Tree::new(op.repo.as_str(), root);
        match &op.select {
            None => {
                let all: Vec<String> = source.eclasses()?.into_iter().collect();
                let src_dir = source.root.join(ECLASS_DIR);
                if src_dir.is_dir() {
                    ctx.files
                        .copy_tree(&src_dir, &tree_root.join(ECLASS_DIR), &SyncOptions::default())?;
                }
                Ok(all)
            }
            Some(names) => {
                let found: Vec<String> = names
                    .iter()
                    .filter(|n| source.has_eclass(n))
                    .cloned()
                    .collect();
                let mapping: BTreeMap<String, String> = found
                    .iter()
                    .map(|n| {
                        let rel = format!("{}/{}.eclass", ECLASS_DIR, n);
                        (rel.clone(), rel)
                    })
                    .collect();
                ctx.files.copy_files(&source.root, tree_root, &mapping)?;
                Ok(found)
            }
        }
    }
}

/// Copy license texts from a repository
pub mod insert_licenses {
    use super::*;

    /// Returns the names of the licenses copied.
    pub fn apply(op: &InsertLicensesOp, tree_root: &Path, ctx: &StepContext) -> Result<Vec<String>> {
        let root = offset_root(ctx.repo_root("insert_licenses", &op.repo)?, &op.offset);
        let source = Tree::new(op.repo.as_str(), root);
        let src_dir = source.root.join(LICENSE_DIR);
        match &op.select {
            None => {
                if !src_dir.is_dir() {
                    return Ok(Vec::new());
                }
                ctx.files
                    .copy_tree(&src_dir, &tree_root.join(LICENSE_DIR), &SyncOptions::default())?;
                let mut names = Vec::new();
                for entry in std::fs::read_dir(&src_dir)? {
                    names.push(entry?.file_name().to_string_lossy().to_string());
                }
                names.sort();
                Ok(names)
            }
            Some(names) => {
                let found: Vec<String> = names
                    .iter()
                    .filter(|n| source.has_license(n))
                    .cloned()
                    .collect();
                let mapping: BTreeMap<String, String> = found
                    .iter()
                    .map(|n| {
                        let rel = format!("{}/{}", LICENSE_DIR, n);
                        (rel.clone(), rel)
                    })
                    .collect();
                ctx.files.copy_files(&source.root, tree_root, &mapping)?;
                Ok(found)
            }
        }
    }
}

/// Write repository identity: `profiles/repo_name`, `metadata/layout.conf`
/// and a `metadata/repos.conf` fragment carrying the priority
pub mod generate_metadata {
    use super::*;
    use std::fs;

    pub fn apply(op: &GenerateMetadataOp, tree_root: &Path) -> Result<()> {
        let profiles = tree_root.join(PROFILES_DIR);
        let metadata = tree_root.join("metadata");
        fs::create_dir_all(&profiles)?;
        fs::create_dir_all(&metadata)?;

        fs::write(profiles.join("repo_name"), format!("{}\n", op.name))?;

        let mut layout = format!("repo-name = {}\n", op.name);
        layout.push_str("thin-manifests = true\n");
        layout.push_str("sign-manifests = false\n");
        layout.push_str("profile-formats = portage-2\n");
        layout.push_str("cache-formats = md5-dict\n");
        layout.push_str(&format!("masters = {}\n", op.masters.join(" ")));
        if !op.aliases.is_empty() {
            layout.push_str(&format!("aliases = {}\n", op.aliases.join(" ")));
        }
        fs::write(metadata.join("layout.conf"), layout)?;

        let repos_conf = metadata.join("repos.conf");
        match op.priority {
            Some(priority) => fs::write(
                repos_conf,
                format!("[{}]\npriority = {}\n", op.name, priority),
            )?,
            None if repos_conf.exists() => fs::remove_file(repos_conf)?,
            None => {}
        }
        Ok(())
    }
}

/// Line deletions and substitutions in tree files
pub mod run_sed {
    use super::*;
    use regex::Regex;
    use std::fs;

    #[derive(Debug)]
    pub(crate) enum Expression {
        Delete(Regex),
        Substitute {
            pattern: Regex,
            replacement: String,
            global: bool,
        },
    }

    /// `\1` back-references become `${1}`, `&` becomes the whole match.
    fn translate_replacement(raw: &str) -> String {
        let mut out = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some(d) if d.is_ascii_digit() => out.push_str(&format!("${{{}}}", d)),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                },
                '&' => out.push_str("${0}"),
                '$' => out.push_str("$$"),
                c => out.push(c),
            }
        }
        out
    }

    /// Split `s<d>a<d>b<d>flags` on the delimiter, honouring `\<d>` escapes.
    fn split_delimited(body: &str, delim: char) -> Vec<String> {
        let mut parts = vec![String::new()];
        let mut chars = body.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == delim {
                parts.push(String::new());
                continue;
            }
            let ch = if ch == '\\' && chars.peek() == Some(&delim) {
                chars.next();
                delim
            } else {
                ch
            };
            if let Some(part) = parts.last_mut() {
                part.push(ch);
            }
        }
        parts
    }

    pub(crate) fn parse(expression: &str) -> Result<Expression> {
        let invalid = || step_error("run_sed", format!("unsupported expression '{}'", expression));
        if let Some(body) = expression.strip_prefix('/') {
            let pattern = body.strip_suffix("/d").ok_or_else(invalid)?;
            return Ok(Expression::Delete(Regex::new(pattern)?));
        }
        let mut chars = expression.chars();
        if chars.next() != Some('s') {
            return Err(invalid());
        }
        let delim = chars.next().ok_or_else(invalid)?;
        let parts = split_delimited(chars.as_str(), delim);
        if parts.len() != 3 {
            return Err(invalid());
        }
        let global = match parts[2].as_str() {
            "" => false,
            "g" => true,
            _ => return Err(invalid()),
        };
        Ok(Expression::Substitute {
            pattern: Regex::new(&parts[0])?,
            replacement: translate_replacement(&parts[1]),
            global,
        })
    }

    pub(crate) fn edit(content: &str, expressions: &[Expression]) -> String {
        let mut out = String::with_capacity(content.len());
        'lines: for line in content.split_inclusive('\n') {
            let (body, newline) = match line.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (line, ""),
            };
            let mut body = body.to_string();
            for expression in expressions {
                match expression {
                    Expression::Delete(pattern) => {
                        if pattern.is_match(&body) {
                            continue 'lines;
                        }
                    }
                    Expression::Substitute {
                        pattern,
                        replacement,
                        global,
                    } => {
                        body = if *global {
                            pattern.replace_all(&body, replacement.as_str()).into_owned()
                        } else {
                            pattern.replace(&body, replacement.as_str()).into_owned()
                        };
                    }
                }
            }
            out.push_str(&body);
            out.push_str(newline);
        }
        out
    }

    pub fn apply(op: &RunSedOp, tree_root: &Path) -> Result<()> {
        let expressions = op
            .expressions
            .iter()
            .map(|e| parse(e))
            .collect::<Result<Vec<_>>>()?;
        for file in &op.files {
            let path = tree_root.join(file);
            if !path.is_file() {
                return Err(step_error("run_sed", format!("{} does not exist", file)));
            }
            let content = fs::read_to_string(&path)?;
            fs::write(&path, edit(&content, &expressions))?;
        }
        Ok(())
    }
}

/// Copy files between two tree directories under new names
pub mod copy_and_rename {
    use super::*;
    use crate::path::rename_with;
    use regex::Regex;

    pub fn apply(op: &CopyAndRenameOp, tree_root: &Path, ctx: &StepContext) -> Result<()> {
        let regex = Regex::new(&op.from)?;
        let src = tree_root.join(&op.src);
        if !src.is_dir() {
            return Err(step_error("copy_and_rename", format!("{} does not exist", op.src)));
        }
        ctx.files.rename_matching(&src, &tree_root.join(&op.dest), &|name: &str| {
            rename_with(&regex, &op.to, name)
        })
    }
}

/// Mask ebuild versions whose `<name>-<version>` matches a glob
pub mod auto_glob_mask {
    use super::*;
    use glob::Pattern;
    use std::fs;
    use std::io::Write;

    pub fn apply(op: &AutoGlobMaskOp, tree_root: &Path) -> Result<()> {
        let pattern = Pattern::new(&op.glob)?;
        let tree = Tree::new("kit", tree_root);
        let mut lines = Vec::new();
        for ebuild in tree.ebuilds(&op.package)? {
            let stem = match ebuild.file_stem() {
                Some(stem) => stem.to_string_lossy().to_string(),
                None => continue,
            };
            if pattern.matches(&stem) {
                lines.push(format!("={}/{}", op.package.category, stem));
            }
        }
        if lines.is_empty() {
            return Ok(());
        }

        let mask = tree_root.join(PROFILES_DIR).join("package.mask");
        let target = if mask.is_file() {
            mask
        } else {
            fs::create_dir_all(&mask)?;
            mask.join(&op.file)
        };
        let mut out = fs::OpenOptions::new().create(true).append(true).open(&target)?;
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }
}

/// Kit-wide housekeeping steps
pub mod housekeeping {
    use super::*;
    use std::fs;
    use walkdir::WalkDir;

    pub fn apply(kind: Housekeeping, tree_root: &Path, ctx: &StepContext) -> Result<()> {
        match kind {
            Housekeeping::ProfileDepFix => profile_dep_fix(tree_root),
            Housekeeping::Minify => minify(tree_root),
            Housekeeping::CreateCategories => create_categories(tree_root),
            Housekeeping::GenUseLocalDesc => gen_use_local_desc(tree_root),
            Housekeeping::GenCache => ctx.cache.generate_cache(tree_root, &ctx.cache_dir),
            Housekeeping::CleanTree => clean_tree(tree_root, ctx.files),
            Housekeeping::EltSymlinkWorkaround => elt_symlink_workaround(tree_root, ctx),
        }
    }

    fn profile_dep_fix(tree_root: &Path) -> Result<()> {
        let profiles = tree_root.join(PROFILES_DIR);
        let desc = profiles.join("profiles.desc");
        if !desc.is_file() {
            return Ok(());
        }
        for line in fs::read_to_string(&desc)?.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(profile) = line.split_whitespace().nth(1) {
                let marker = profiles.join(profile).join("deprecated");
                if marker.is_file() {
                    fs::remove_file(marker)?;
                }
            }
        }
        Ok(())
    }

    fn minify(tree_root: &Path) -> Result<()> {
        let walker = WalkDir::new(tree_root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        let mut changelogs = Vec::new();
        let mut manifests = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| Error::external("walk", tree_root.display(), e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.to_ascii_lowercase().starts_with("changelog") {
                changelogs.push(entry.path().to_path_buf());
            } else if name == "Manifest" {
                manifests.push(entry.path().to_path_buf());
            }
        }
        for path in changelogs {
            fs::remove_file(path)?;
        }
        for path in manifests {
            let content = fs::read_to_string(&path)?;
            let kept: String = content
                .lines()
                .filter(|l| l.starts_with("DIST"))
                .map(|l| format!("{}\n", l))
                .collect();
            fs::write(&path, kept)?;
        }
        Ok(())
    }

    fn create_categories(tree_root: &Path) -> Result<()> {
        let tree = Tree::new("kit", tree_root);
        let mut present = Vec::new();
        for cat in tree.physical_categories()? {
            let has_package = fs::read_dir(tree_root.join(&cat))?
                .filter_map(|e| e.ok())
                .any(|e| e.path().is_dir());
            if has_package {
                present.push(cat);
            }
        }
        let profiles = tree_root.join(PROFILES_DIR);
        fs::create_dir_all(&profiles)?;
        let content: String = present.iter().map(|c| format!("{}\n", c)).collect();
        fs::write(profiles.join("categories"), content)?;
        Ok(())
    }

    fn gen_use_local_desc(tree_root: &Path) -> Result<()> {
        let tree = Tree::new("kit", tree_root);
        let mut out = String::from(
            "# This file is deprecated as per GLEP 56 in favor of metadata.xml.\n\
             # Please add your descriptions to your package's metadata.xml ONLY.\n\
             # * generated automatically using kit-merge *\n\n",
        );
        for (id, flags) in tree.local_use_flags()? {
            for (flag, desc) in flags {
                out.push_str(&format!("{}:{} - {}\n", id, flag, desc));
            }
        }
        let profiles = tree_root.join(PROFILES_DIR);
        fs::create_dir_all(&profiles)?;
        fs::write(profiles.join("use.local.desc"), out)?;
        Ok(())
    }

    fn clean_tree(tree_root: &Path, files: &dyn FileSync) -> Result<()> {
        if !tree_root.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(tree_root)? {
            let entry = entry?;
            if entry.file_name() == ".git" {
                continue;
            }
            files.remove_path(&entry.path())?;
        }
        Ok(())
    }

    fn elt_symlink_workaround(tree_root: &Path, ctx: &StepContext) -> Result<()> {
        let tree = Tree::new("kit", tree_root);
        if !tree.has_eclass("libtool") {
            return Ok(());
        }
        let Some(primary) = ctx.primary else {
            return Ok(());
        };
        let patches = primary.join(ECLASS_DIR).join("ELT-patches");
        if !patches.is_dir() {
            return Ok(());
        }
        let dest = tree_root.join(ECLASS_DIR).join("ELT-patches");
        ctx.files.remove_path(&dest)?;
        ctx.files.copy_tree(&patches, &dest, &SyncOptions::default())
    }
}

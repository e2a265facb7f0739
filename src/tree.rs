//! # Package Tree Scanning
//!
//! A package tree is a directory laid out as `<category>/<package>/*.ebuild`
//! with shared build logic in `eclass/*.eclass`, license texts in
//! `licenses/` and profile data in `profiles/`. This module reads that
//! layout: which categories and packages exist, which eclasses and licenses
//! the packages reference, and which of those are physically present.
//!
//! Reference extraction is line-oriented. `inherit a b` statements are
//! picked up at the start of a line or after `&&`, `||`, `;` or `then`;
//! `LICENSE="..."` assignments may span several lines. Tokens that contain
//! shell expansions, USE conditionals (`flag?`) and grouping operators are
//! ignored.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::package::PackageId;

pub const ECLASS_DIR: &str = "eclass";
pub const LICENSE_DIR: &str = "licenses";
pub const PROFILES_DIR: &str = "profiles";

/// Top-level directories that are never categories.
const RESERVED_DIRS: &[&str] = &[ECLASS_DIR, LICENSE_DIR, PROFILES_DIR, "metadata", "scripts"];

fn holds_ebuilds(dir: &Path) -> Result<bool> {
    for pkg in fs::read_dir(dir)? {
        let pkg = pkg?.path();
        if !pkg.is_dir() {
            continue;
        }
        for file in fs::read_dir(&pkg)? {
            if file?.path().extension().is_some_and(|e| e == "ebuild") {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn inherit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|&&|\|\||;|\bthen\b)\s*inherit\s+([^;&|#]+)").expect("static regex")
    })
}

fn license_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*LICENSE=(?:"([^"]*)"|'([^']*)'|(\S+))"#).expect("static regex")
    })
}

fn is_plain_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
        && !token.starts_with('-')
}

/// Extract eclass names from `inherit` statements in ebuild or eclass text.
pub fn parse_inherits(content: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let joined = content.replace("\\\n", " ");
    for line in joined.lines() {
        let line = line.split(" #").next().unwrap_or(line);
        if line.trim_start().starts_with('#') {
            continue;
        }
        for caps in inherit_regex().captures_iter(line) {
            if let Some(list) = caps.get(1) {
                out.extend(
                    list.as_str()
                        .split_whitespace()
                        .filter(|t| is_plain_token(t))
                        .map(str::to_string),
                );
            }
        }
    }
    out
}

/// Extract license names from `LICENSE=` assignments.
pub fn parse_licenses(content: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for caps in license_regex().captures_iter(content) {
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        out.extend(
            value
                .split_whitespace()
                .filter(|t| !t.ends_with('?') && !t.starts_with('!'))
                .filter(|t| is_plain_token(t))
                .map(str::to_string),
        );
    }
    out
}

/// A read-only view of a package tree rooted at `root`.
#[derive(Debug, Clone)]
pub struct Tree {
    pub name: String,
    pub root: PathBuf,
}

impl Tree {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    /// Categories of this tree.
    ///
    /// Taken from `profiles/categories` when present, otherwise every
    /// top-level directory whose name contains `-`, plus `virtual`.
    pub fn categories(&self) -> Result<Vec<String>> {
        let catfile = self.root.join(PROFILES_DIR).join("categories");
        if catfile.is_file() {
            let content = fs::read_to_string(&catfile)?;
            return Ok(content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect());
        }
        self.physical_categories()
    }

    /// Top-level directories that look like categories: the name contains
    /// `-`, is `virtual`, or the directory holds a package with ebuilds.
    pub fn physical_categories(&self) -> Result<Vec<String>> {
        let mut cats = Vec::new();
        if !self.root.is_dir() {
            return Ok(cats);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.file_type()?.is_dir() || name.starts_with('.') || RESERVED_DIRS.contains(&name.as_str()) {
                continue;
            }
            if name.contains('-') || name == "virtual" || holds_ebuilds(&entry.path())? {
                cats.push(name);
            }
        }
        cats.sort();
        Ok(cats)
    }

    /// Every package directory present under the tree's categories, listed
    /// or physical.
    pub fn packages(&self) -> Result<BTreeSet<PackageId>> {
        let mut out = BTreeSet::new();
        let mut cats: BTreeSet<String> = self.categories()?.into_iter().collect();
        cats.extend(self.physical_categories()?);
        for cat in cats {
            let catdir = self.root.join(&cat);
            if !catdir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&catdir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if !name.starts_with('.') {
                        out.insert(PackageId::new(cat.clone(), name));
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn has_package(&self, id: &PackageId) -> bool {
        self.root.join(id.rel_path()).is_dir()
    }

    /// Ebuild files of one package.
    pub fn ebuilds(&self, id: &PackageId) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(id.rel_path());
        let mut out = Vec::new();
        if !dir.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "ebuild") {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn eclass_path(&self, name: &str) -> PathBuf {
        self.root.join(ECLASS_DIR).join(format!("{}.eclass", name))
    }

    pub fn license_path(&self, name: &str) -> PathBuf {
        self.root.join(LICENSE_DIR).join(name)
    }

    pub fn has_eclass(&self, name: &str) -> bool {
        self.eclass_path(name).is_file()
    }

    pub fn has_license(&self, name: &str) -> bool {
        self.license_path(name).is_file()
    }

    /// Names of the eclasses physically present.
    pub fn eclasses(&self) -> Result<BTreeSet<String>> {
        let dir = self.root.join(ECLASS_DIR);
        let mut out = BTreeSet::new();
        if !dir.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "eclass") {
                if let Some(stem) = path.file_stem() {
                    out.insert(stem.to_string_lossy().to_string());
                }
            }
        }
        Ok(out)
    }

    /// Eclasses referenced directly by the ebuilds of `packages`.
    pub fn package_eclass_refs<'a, I>(&self, packages: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a PackageId>,
    {
        let mut out = BTreeSet::new();
        for id in packages {
            for ebuild in self.ebuilds(id)? {
                out.extend(parse_inherits(&fs::read_to_string(&ebuild)?));
            }
        }
        Ok(out)
    }

    /// Licenses referenced by the ebuilds of `packages`.
    pub fn package_license_refs<'a, I>(&self, packages: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a PackageId>,
    {
        let mut out = BTreeSet::new();
        for id in packages {
            for ebuild in self.ebuilds(id)? {
                out.extend(parse_licenses(&fs::read_to_string(&ebuild)?));
            }
        }
        Ok(out)
    }

    /// `inherit` lines of one eclass file in this tree (empty when absent).
    pub fn eclass_inherits(&self, name: &str) -> Result<BTreeSet<String>> {
        let path = self.eclass_path(name);
        if !path.is_file() {
            return Ok(BTreeSet::new());
        }
        Ok(parse_inherits(&fs::read_to_string(path)?))
    }

    /// Eclasses referenced by any package or any present eclass that are not
    /// themselves present. This is the missing set of the eclass closure.
    pub fn missing_eclasses(&self) -> Result<BTreeSet<String>> {
        let present = self.eclasses()?;
        let mut wanted = self.package_eclass_refs(self.packages()?.iter())?;
        for eclass in &present {
            wanted.extend(self.eclass_inherits(eclass)?);
        }
        Ok(wanted.difference(&present).cloned().collect())
    }

    /// Licenses referenced by any package that are not present.
    pub fn missing_licenses(&self) -> Result<BTreeSet<String>> {
        let refs = self.package_license_refs(self.packages()?.iter())?;
        Ok(refs.into_iter().filter(|l| !self.has_license(l)).collect())
    }

    /// Eclasses reachable from `packages` within this tree: directly
    /// inherited ones plus everything those eclasses inherit in turn.
    pub fn reachable_eclasses<'a, I>(&self, packages: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a PackageId>,
    {
        let mut seen = BTreeSet::new();
        let mut queue: Vec<String> = self.package_eclass_refs(packages)?.into_iter().collect();
        while let Some(name) = queue.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            queue.extend(self.eclass_inherits(&name)?);
        }
        Ok(seen)
    }

    /// USE flag descriptions declared in each package's `metadata.xml`.
    pub fn local_use_flags(&self) -> Result<BTreeMap<PackageId, Vec<(String, String)>>> {
        static FLAG: OnceLock<Regex> = OnceLock::new();
        let flag_re = FLAG.get_or_init(|| {
            Regex::new(r#"(?s)<flag\s+name\s*=\s*["']([^"']+)["'][^>]*>(.*?)</flag>"#)
                .expect("static regex")
        });
        static TAG: OnceLock<Regex> = OnceLock::new();
        let tag_re = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"));

        let mut out = BTreeMap::new();
        for id in self.packages()? {
            let meta = self.root.join(id.rel_path()).join("metadata.xml");
            if !meta.is_file() {
                continue;
            }
            let content = fs::read_to_string(&meta)?;
            let flags: Vec<(String, String)> = flag_re
                .captures_iter(&content)
                .map(|c| {
                    let desc = tag_re.replace_all(&c[2], "");
                    let desc = desc.split_whitespace().collect::<Vec<_>>().join(" ");
                    (c[1].to_string(), desc)
                })
                .collect();
            if !flags.is_empty() {
                out.insert(id, flags);
            }
        }
        Ok(out)
    }
}

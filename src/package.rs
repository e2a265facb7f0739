//! Package identities and curated package-set rules

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A `(category, name)` pair identifying a package regardless of the
/// repository it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId {
    pub category: String,
    pub name: String,
}

impl PackageId {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Relative directory of this package inside a tree.
    pub fn rel_path(&self) -> std::path::PathBuf {
        Path::new(&self.category).join(&self.name)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

fn valid_component(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

impl FromStr for PackageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((category, name)) if valid_component(category) && valid_component(name) => {
                Ok(PackageId::new(category, name))
            }
            _ => Err(Error::configuration(format!(
                "invalid package identifier '{}', expected category/name",
                s
            ))),
        }
    }
}

impl TryFrom<String> for PackageId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PackageId> for String {
    fn from(value: PackageId) -> Self {
        value.to_string()
    }
}

/// The curated rules deciding which packages a kit wants.
///
/// Patterns use glob syntax against `category/name`. A leading `!` turns a
/// pattern into an exclusion; exclusions always win over inclusions.
#[derive(Debug, Clone)]
pub enum PackageSet {
    /// Every package (used by the catch-all kit).
    All,
    Patterns {
        include: Vec<Pattern>,
        exclude: Vec<Pattern>,
    },
}

impl PackageSet {
    /// Build a package set from pattern strings.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            match raw.strip_prefix('!') {
                Some(negated) => exclude.push(Pattern::new(negated.trim())?),
                None => include.push(Pattern::new(raw)?),
            }
        }
        Ok(PackageSet::Patterns { include, exclude })
    }

    /// Read additional patterns from a package-set file (one per line, `#`
    /// comments) and merge them with `extra`.
    pub fn load(extra: &[String], file: Option<&Path>) -> Result<Self> {
        let mut patterns: Vec<String> = extra.to_vec();
        if let Some(file) = file {
            let content = fs::read_to_string(file).map_err(|e| Error::Configuration {
                message: format!("cannot read package set {}: {}", file.display(), e),
                hint: Some("package_set_file is resolved relative to the definitions file".into()),
            })?;
            patterns.extend(content.lines().map(str::to_string));
        }
        Self::from_patterns(patterns)
    }

    pub fn matches(&self, id: &PackageId) -> bool {
        match self {
            PackageSet::All => true,
            PackageSet::Patterns { include, exclude } => {
                let key = id.to_string();
                include.iter().any(|p| p.matches(&key)) && !exclude.iter().any(|p| p.matches(&key))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PackageSet::All => false,
            PackageSet::Patterns { include, .. } => include.is_empty(),
        }
    }
}

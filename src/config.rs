//! # Generation Definitions
//!
//! This module defines the data structures that represent the YAML
//! generation definitions: which repositories exist, how they are combined
//! into ordered kit sources, which kits belong to which group, and the order
//! in which groups are generated.
//!
//! ## Key Components
//!
//! - **`GenerationConfig`**: the whole definitions file.
//! - **`RepositoryDef`** and **`SourceEntry`**: a source repository and its
//!   pin inside a kit source. Together they describe a `SourceRepo`.
//! - **`KitDef`**: one kit of a group, with its package set and steps.
//! - **`OrderEntry`**: a group name or the `reset` scope boundary.
//!
//! Parsing is strict (`deny_unknown_fields`) and [`GenerationConfig::validate`]
//! checks cross references before any repository is touched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults::DEFAULT_BRANCH;
use crate::error::{Error, Result};
use crate::package::{PackageId, PackageSet};
use crate::settings::Settings;
use crate::steps::Step;

/// Marker in `order` that clears the exclusivity ledger.
pub const RESET_MARKER: &str = "reset";

/// Where a source repository is checked out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Pin {
    Branch(String),
    Commit(String),
}

impl Pin {
    /// The branch name or commit id.
    pub fn reference(&self) -> &str {
        match self {
            Pin::Branch(r) | Pin::Commit(r) => r,
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Branch(b) => write!(f, "branch {}", b),
            Pin::Commit(c) => write!(f, "commit {}", c),
        }
    }
}

/// A source repository.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RepositoryDef {
    pub url: String,
    /// Allow-list: when present only these packages may come from here
    #[serde(default)]
    pub select: Option<Vec<PackageId>>,
    /// Eclasses copied whenever packages are drawn from this repository
    #[serde(default)]
    pub eclasses: Vec<String>,
    /// Auxiliary files copied whenever packages are drawn from here
    #[serde(default)]
    pub copyfiles: BTreeMap<String, String>,
}

/// One entry of a kit source: a repository and its pin.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceEntry {
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

impl SourceEntry {
    pub fn pin(&self) -> Result<Pin> {
        match (&self.branch, &self.commit) {
            (Some(branch), None) => Ok(Pin::Branch(branch.clone())),
            (None, Some(commit)) => Ok(Pin::Commit(commit.clone())),
            _ => Err(Error::Configuration {
                message: format!("source entry for {} must set exactly one of branch or commit", self.repo),
                hint: Some("use `branch: master` to track a branch or `commit: <sha1>` to pin".into()),
            }),
        }
    }
}

fn default_fixups_name() -> String {
    "kit-fixups".to_string()
}

fn default_umbrella_name() -> String {
    "meta-repo".to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// The fix-up repository.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FixupsDef {
    #[serde(default = "default_fixups_name")]
    pub name: String,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// The umbrella repository that records published kits.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UmbrellaDef {
    #[serde(default = "default_umbrella_name")]
    pub name: String,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// One kit of a group.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct KitDef {
    pub name: String,
    pub branch: String,
    /// Name of a kit source
    pub source: String,
    /// Carry the complete eclass set of the primary upstream
    #[serde(default)]
    pub all_eclasses: bool,
    /// Check out and register the kit after the run
    #[serde(default)]
    pub publish: bool,
    /// Claim everything no other kit of the scope claimed
    #[serde(default)]
    pub catch_all: bool,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub package_set_file: Option<PathBuf>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub masters: Vec<String>,
    #[serde(default)]
    pub pre: Vec<Step>,
    #[serde(default)]
    pub post: Vec<Step>,
}

/// An entry of the generation order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum OrderEntry {
    Group(String),
    /// Scope boundary: the exclusivity ledger is cleared here
    Reset,
}

impl From<Option<String>> for OrderEntry {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if name != RESET_MARKER => OrderEntry::Group(name),
            _ => OrderEntry::Reset,
        }
    }
}

/// The complete generation definitions.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    pub repositories: BTreeMap<String, RepositoryDef>,
    pub kit_sources: BTreeMap<String, Vec<SourceEntry>>,
    /// Repositories only referenced by steps
    #[serde(default)]
    pub supplemental: Vec<SourceEntry>,
    pub fixups: FixupsDef,
    #[serde(default)]
    pub umbrella: Option<UmbrellaDef>,
    pub groups: BTreeMap<String, Vec<KitDef>>,
    pub order: Vec<OrderEntry>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl GenerationConfig {
    /// Parse definitions from YAML text. Relative paths resolve against
    /// the current directory.
    pub fn parse(yaml: &str) -> Result<Self> {
        let mut config: GenerationConfig = serde_yaml::from_str(yaml)?;
        config.base_dir = PathBuf::from(".");
        Ok(config)
    }

    /// Load definitions from a file. Relative paths resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Configuration {
            message: format!("cannot read definitions {}: {}", path.display(), e),
            hint: None,
        })?;
        let mut config = Self::parse(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    pub fn repository(&self, name: &str) -> Result<&RepositoryDef> {
        self.repositories
            .get(name)
            .ok_or_else(|| Error::configuration(format!("unknown repository {}", name)))
    }

    pub fn kit_source(&self, name: &str) -> Result<&[SourceEntry]> {
        self.kit_sources
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::configuration(format!("unknown kit source {}", name)))
    }

    /// Package set of a kit, with `package_set_file` resolved against
    /// [`GenerationConfig::base_dir`].
    pub fn package_set(&self, kit: &KitDef) -> Result<PackageSet> {
        if kit.catch_all {
            return Ok(PackageSet::All);
        }
        let file = kit.package_set_file.as_ref().map(|f| self.base_dir.join(f));
        PackageSet::load(&kit.packages, file.as_deref())
    }

    /// Every kit, in generation order, with the scope boundaries between.
    pub fn sequence(&self) -> Vec<Sequenced<'_>> {
        let mut out = Vec::new();
        for entry in &self.order {
            match entry {
                OrderEntry::Reset => out.push(Sequenced::Reset),
                OrderEntry::Group(group) => {
                    if let Some(kits) = self.groups.get(group) {
                        out.extend(kits.iter().map(|kit| Sequenced::Kit { group, kit }));
                    }
                }
            }
        }
        out
    }

    /// Apply `[sources]` and `[branches]` overrides from the settings file.
    pub fn apply_settings(&mut self, settings: &Settings) -> Result<()> {
        for (name, url) in &settings.sources {
            if let Some(repo) = self.repositories.get_mut(name) {
                repo.url = url.clone();
            } else if *name == self.fixups.name {
                self.fixups.url = url.clone();
            } else if let Some(umbrella) = self.umbrella.as_mut().filter(|u| u.name == *name) {
                umbrella.url = url.clone();
            } else {
                return Err(Error::Settings {
                    message: format!("[sources] names unknown repository {}", name),
                });
            }
        }

        for (name, branch) in &settings.branches {
            let mut known = false;
            if *name == self.fixups.name {
                self.fixups.branch = branch.clone();
                known = true;
            }
            if let Some(umbrella) = self.umbrella.as_mut().filter(|u| u.name == *name) {
                umbrella.branch = branch.clone();
                known = true;
            }
            let entries = self
                .kit_sources
                .values_mut()
                .flatten()
                .chain(self.supplemental.iter_mut())
                .filter(|e| e.repo == *name && e.branch.is_some());
            for entry in entries {
                entry.branch = Some(branch.clone());
                known = true;
            }
            if !known && !self.repositories.contains_key(name) {
                return Err(Error::Settings {
                    message: format!("[branches] names unknown repository {}", name),
                });
            }
        }
        Ok(())
    }

    /// Check every cross reference of the definitions.
    pub fn validate(&self) -> Result<()> {
        for (source, entries) in &self.kit_sources {
            if entries.is_empty() {
                return Err(Error::configuration(format!("kit source {} is empty", source)));
            }
            for entry in entries {
                self.check_entry(entry, &format!("kit source {}", source))?;
            }
        }
        for entry in &self.supplemental {
            self.check_entry(entry, "supplemental")?;
        }

        if self.groups.contains_key(RESET_MARKER) {
            return Err(Error::Configuration {
                message: format!("'{}' cannot be used as a group name", RESET_MARKER),
                hint: Some("it marks scope boundaries in `order`".into()),
            });
        }
        for (index, entry) in self.order.iter().enumerate() {
            let OrderEntry::Group(group) = entry else {
                continue;
            };
            let Some(kits) = self.groups.get(group) else {
                return Err(Error::configuration(format!("order names unknown group {}", group)));
            };
            let closes_scope = matches!(self.order.get(index + 1), None | Some(OrderEntry::Reset));
            if let Some(kit) = kits.iter().find(|k| k.catch_all).filter(|_| !closes_scope) {
                return Err(Error::Configuration {
                    message: format!(
                        "catch-all kit {} in group {} must be in the last group before a reset",
                        kit.name, group
                    ),
                    hint: Some("groups after it in the same scope would get no packages".into()),
                });
            }
        }

        for (group, kits) in &self.groups {
            let mut names = BTreeSet::new();
            for (index, kit) in kits.iter().enumerate() {
                if !names.insert(kit.name.as_str()) {
                    return Err(Error::configuration(format!(
                        "kit {} appears twice in group {}",
                        kit.name, group
                    )));
                }
                let entries = self.kit_source(&kit.source).map_err(|_| Error::Configuration {
                    message: format!("kit {} uses unknown kit source {}", kit.name, kit.source),
                    hint: Some(format!(
                        "known kit sources: {}",
                        self.kit_sources.keys().cloned().collect::<Vec<_>>().join(", ")
                    )),
                })?;
                if kit.catch_all {
                    if index + 1 != kits.len() {
                        return Err(Error::Configuration {
                            message: format!("catch-all kit {} must be the last kit of group {}", kit.name, group),
                            hint: Some("it claims whatever the other kits of the scope left".into()),
                        });
                    }
                    if !kit.packages.is_empty() || kit.package_set_file.is_some() {
                        return Err(Error::configuration(format!(
                            "catch-all kit {} cannot list packages",
                            kit.name
                        )));
                    }
                }

                let available: BTreeSet<&str> = entries
                    .iter()
                    .chain(self.supplemental.iter())
                    .map(|e| e.repo.as_str())
                    .chain(std::iter::once(self.fixups.name.as_str()))
                    .collect();
                for step in kit.pre.iter().chain(kit.post.iter()) {
                    if let Some(repo) = step.repository() {
                        if !available.contains(repo) {
                            return Err(Error::Configuration {
                                message: format!(
                                    "step {} of kit {} references repository {} outside its sources",
                                    step.name(),
                                    kit.name,
                                    repo
                                ),
                                hint: Some("add the repository to `supplemental`".into()),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_entry(&self, entry: &SourceEntry, context: &str) -> Result<()> {
        if !self.repositories.contains_key(&entry.repo) {
            return Err(Error::configuration(format!(
                "{} references unknown repository {}",
                context, entry.repo
            )));
        }
        entry.pin().map(|_| ())
    }
}

/// An item of the flattened generation order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sequenced<'a> {
    Reset,
    Kit { group: &'a str, kit: &'a KitDef },
}


#[cfg(test)]
mod tests {
    use super::fixtures::DEFINITIONS;
    use super::*;

    fn config() -> GenerationConfig {
        GenerationConfig::parse(DEFINITIONS).unwrap()
    }

    #[test]
    fn test_parse_definitions() {
        let config = config();
        assert_eq!(config.repositories.len(), 3);
        let flora = config.repository("flora").unwrap();
        assert_eq!(flora.select.as_ref().unwrap()[0].to_string(), "app-editors/vim");
        assert_eq!(flora.eclasses, vec!["vim-plugin"]);
        assert_eq!(config.fixups.name, "kit-fixups");
        assert_eq!(config.fixups.branch, "master");
        assert_eq!(config.umbrella.as_ref().unwrap().name, "meta-repo");
        assert_eq!(
            config.order,
            vec![
                OrderEntry::Group("prime".into()),
                OrderEntry::Reset,
                OrderEntry::Group("current".into())
            ]
        );
        let core = &config.groups["prime"][0];
        assert!(core.all_eclasses && core.publish);
        assert_eq!(core.pre.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_null_order_entry_is_reset() {
        let yaml = DEFINITIONS.replace("order: [prime, reset, current]", "order: [prime, ~, current]");
        let config = GenerationConfig::parse(&yaml).unwrap();
        assert_eq!(config.order[1], OrderEntry::Reset);
    }

    #[test]
    fn test_pin_requires_exactly_one() {
        let both = SourceEntry {
            repo: "x".into(),
            branch: Some("master".into()),
            commit: Some("abc".into()),
        };
        assert!(both.pin().is_err());
        let neither = SourceEntry {
            repo: "x".into(),
            branch: None,
            commit: None,
        };
        assert!(neither.pin().is_err());
        let commit = SourceEntry {
            repo: "x".into(),
            branch: None,
            commit: Some("abc".into()),
        };
        assert_eq!(commit.pin().unwrap(), Pin::Commit("abc".into()));
    }

    #[test]
    fn test_sequence_places_resets() {
        let config = config();
        let seq = config.sequence();
        assert_eq!(seq.len(), 4);
        assert!(matches!(seq[0], Sequenced::Kit { group: "prime", .. }));
        assert_eq!(seq[1], Sequenced::Reset);
        match seq[3] {
            Sequenced::Kit { kit, .. } => assert_eq!(kit.name, "nokit"),
            _ => panic!("expected kit"),
        }
    }

    #[test]
    fn test_validate_unknown_source() {
        let yaml = DEFINITIONS.replace("source: prime", "source: nope");
        let err = GenerationConfig::parse(&yaml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("unknown kit source nope"));
    }

    #[test]
    fn test_validate_unknown_group_in_order() {
        let yaml = DEFINITIONS.replace("order: [prime, reset, current]", "order: [prime, shared]");
        let err = GenerationConfig::parse(&yaml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("unknown group shared"));
    }

    #[test]
    fn test_validate_catch_all_must_be_last() {
        let yaml = DEFINITIONS.replace(
            "    - { name: editors-kit, branch: master, source: current, packages: [app-editors/*] }\n    - { name: nokit, branch: master, source: current, catch_all: true }",
            "    - { name: nokit, branch: master, source: current, catch_all: true }\n    - { name: editors-kit, branch: master, source: current, packages: [app-editors/*] }",
        );
        let err = GenerationConfig::parse(&yaml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("must be the last kit"));
    }

    #[test]
    fn test_validate_catch_all_group_must_close_scope() {
        let yaml = DEFINITIONS.replace("order: [prime, reset, current]", "order: [current, prime]");
        let err = GenerationConfig::parse(&yaml).unwrap().validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("catch-all kit nokit in group current"));

        let yaml = DEFINITIONS.replace("order: [prime, reset, current]", "order: [current, reset, prime]");
        GenerationConfig::parse(&yaml).unwrap().validate().unwrap();
        let yaml = DEFINITIONS.replace("order: [prime, reset, current]", "order: [prime, current]");
        GenerationConfig::parse(&yaml).unwrap().validate().unwrap();
    }

    #[test]
    fn test_validate_step_repository_outside_sources() {
        let yaml = DEFINITIONS.replace(
            "  - { repo: funtoo-overlay, branch: master }\n",
            "",
        );
        let yaml = yaml.replace("supplemental:\n", "");
        let err = GenerationConfig::parse(&yaml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("funtoo-overlay"));
    }

    #[test]
    fn test_validate_unknown_repository_in_source() {
        let yaml = DEFINITIONS.replace("{ repo: flora, branch: master }", "{ repo: flor, branch: master }");
        let err = GenerationConfig::parse(&yaml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("unknown repository flor"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = DEFINITIONS.replace("all_eclasses: true", "all_eclass: true");
        assert!(GenerationConfig::parse(&yaml).is_err());
    }

    #[test]
    fn test_apply_settings_overrides() {
        let mut config = config();
        let mut settings = Settings::default();
        settings.sources.insert("flora".into(), "file:///srv/flora".into());
        settings.sources.insert("kit-fixups".into(), "file:///srv/fixups".into());
        settings.branches.insert("flora".into(), "develop".into());
        settings.branches.insert("meta-repo".into(), "next".into());
        config.apply_settings(&settings).unwrap();

        assert_eq!(config.repository("flora").unwrap().url, "file:///srv/flora");
        assert_eq!(config.fixups.url, "file:///srv/fixups");
        assert_eq!(config.kit_sources["current"][1].branch.as_deref(), Some("develop"));
        assert_eq!(config.umbrella.as_ref().unwrap().branch, "next");

        let mut bad = Settings::default();
        bad.sources.insert("nope".into(), "x".into());
        assert!(config.apply_settings(&bad).is_err());
    }

    #[test]
    fn test_package_set_for_kits() {
        let config = config();
        let core = &config.groups["prime"][0];
        let set = config.package_set(core).unwrap();
        assert!(set.matches(&"sys-apps/portage".parse().unwrap()));
        assert!(!set.matches(&"sys-apps/foo".parse().unwrap()));
        let nokit = &config.groups["current"][1];
        assert!(matches!(config.package_set(nokit).unwrap(), PackageSet::All));
    }
}

//! # Kit Merge Library
//!
//! This library regenerates "kits": curated, self-contained package
//! collections assembled from prioritized upstream package repositories and
//! a fix-up repository. It is used by the `kit-merge` command-line tool but
//! every collaborator (version control, file sync, metadata cache) sits
//! behind a trait, so the whole generation can also be driven in-process.
//!
//! ## Quick Example
//!
//! ```
//! use kit_merge::ledger::ExclusivityLedger;
//! use kit_merge::package::PackageId;
//!
//! let mut ledger = ExclusivityLedger::new();
//! let id: PackageId = "sys-apps/portage".parse().unwrap();
//!
//! assert!(ledger.claim(id.clone(), "core-kit"));
//! // A second kit of the same scope cannot take it
//! assert!(!ledger.claim(id.clone(), "nokit"));
//!
//! // Until the scope is reset
//! ledger.reset();
//! assert!(ledger.claim(id, "nokit"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Definitions (`config`)**: repositories, kit sources, kits, groups and
//!   the generation order, loaded from YAML. Site settings (`settings`) come
//!   from an INI file.
//! - **Package trees (`tree`, `package`)**: scanning categories, packages and
//!   their eclass and license references.
//! - **Exclusivity (`ledger`)**: which kit claimed which package in the
//!   current scope.
//! - **Steps (`steps`)**: the closed set of operations a kit may apply to
//!   its tree before and after the pipeline.
//! - **Phases (`phases`)**: the per-kit pipeline of prep, selection,
//!   fix-ups, eclass closure, license closure and finalize.
//! - **Generation (`generation`)**: runs every kit in order, resets scopes,
//!   publishes kits and updates the umbrella repository.

pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod filesystem;
pub mod generation;
pub mod git;
pub mod ledger;
pub mod package;
pub mod path;
pub mod phases;
pub mod repository;
pub mod settings;
pub mod sources;
pub mod steps;
pub mod tree;

#[cfg(test)]
mod package_proptest;

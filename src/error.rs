//! # Error Handling
//!
//! This module defines the centralized error type for `kit-merge`. It uses
//! `thiserror` to describe every failure mode the generation run can hit,
//! each with enough context for an operator to act on it.
//!
//! ## Taxonomy
//!
//! - **`Configuration`**: a repository or pin could not be resolved, or the
//!   generation definitions are inconsistent.
//! - **`Convergence`**: the eclass closure did not reach a fixpoint within
//!   the iteration bound. Carries the still-missing eclass names.
//! - **`UnresolvedLicense`**: one or more licenses were absent from every
//!   searched repository. Carries every unresolved name and the
//!   repositories consulted for it.
//! - **`ExternalOperation`**: a version-control, file-sync or metadata-cache
//!   collaborator call failed.
//!
//! All of them abort the current run. Nothing is silently recovered and no
//! kit is committed after a failure.

use std::fmt;

use thiserror::Error;

/// A license that could not be located in any source repository of a kit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedLicense {
    /// License file name, e.g. `GPL-2`
    pub name: String,
    /// Kit whose packages reference the license
    pub kit: String,
    /// Repositories searched, in search order
    pub searched: Vec<String>,
}

impl fmt::Display for UnresolvedLicense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (kit {}, searched: {})",
            self.name,
            self.kit,
            self.searched.join(", ")
        )
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("\n  hint: {}", h))
        .unwrap_or_default()
}

fn join_licenses(licenses: &[UnresolvedLicense]) -> String {
    licenses
        .iter()
        .map(|l| format!("\n  {}", l))
        .collect::<String>()
}

/// Main error type for kit-merge operations
#[derive(Error, Debug)]
pub enum Error {
    /// A repository, pin or definition could not be resolved.
    #[error("Configuration error: {message}{}", hint_suffix(hint))]
    Configuration {
        message: String,
        /// Optional hint for how to fix the definitions
        hint: Option<String>,
    },

    /// The eclass closure failed to reach a fixpoint.
    #[error(
        "Eclass closure for {kit} did not converge after {iterations} iterations; missing: {}; consulted: {}",
        missing.join(" "),
        consulted.join(", ")
    )]
    Convergence {
        kit: String,
        missing: Vec<String>,
        consulted: Vec<String>,
        iterations: u32,
    },

    /// Licenses referenced by packages are absent from every source repository.
    #[error("Unresolved licenses:{}", join_licenses(licenses))]
    UnresolvedLicense { licenses: Vec<UnresolvedLicense> },

    /// A version-control, file-sync or metadata-cache call failed.
    #[error("External operation failed: {operation} on {target}: {message}")]
    ExternalOperation {
        operation: String,
        target: String,
        message: String,
    },

    /// The INI settings file is missing or malformed.
    #[error("Settings error: {message}")]
    Settings { message: String },

    /// A configured tree step could not be applied.
    #[error("Step error: {step} - {message}")]
    Step { step: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// An INI parsing error, wrapped from `ini::ParseError`.
    #[error("INI parsing error: {0}")]
    Ini(#[from] ini::ParseError),
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a failed collaborator call.
    pub fn external(
        operation: impl Into<String>,
        target: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Error::ExternalOperation {
            operation: operation.into(),
            target: target.to_string(),
            message: message.into(),
        }
    }

    /// No error is recovered from: the current run always aborts.
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            1
        } else {
            0
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

//! Phase 5: License closure
//!
//! Licenses referenced by the kit's packages are looked up in every kit
//! source repository, in precedence order, and the first copy found wins.
//! There is no retry: a license no repository carries is reported together
//! with every other unresolved license and aborts the kit.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use super::{Collaborators, KitContext};
use crate::error::{Error, Result, UnresolvedLicense};
use crate::tree::LICENSE_DIR;

/// Execute Phase 5
///
/// Returns the licenses copied, each with the repository it came from.
pub fn execute(ctx: &KitContext, collab: &Collaborators) -> Result<BTreeMap<String, String>> {
    let tree = ctx.tree();
    let mut missing: BTreeSet<String> = tree.missing_licenses()?;
    let mut copied = BTreeMap::new();
    if missing.is_empty() {
        return Ok(copied);
    }

    for repo in &ctx.sources {
        if missing.is_empty() {
            break;
        }
        let allowed = repo.allowed_licenses()?;
        let source = repo.tree();
        let found: Vec<String> = missing
            .iter()
            .filter(|name| allowed.as_ref().is_none_or(|a| a.contains(*name)))
            .filter(|name| source.has_license(name))
            .cloned()
            .collect();
        if found.is_empty() {
            continue;
        }
        let mapping: BTreeMap<String, String> = found
            .iter()
            .map(|name| {
                let rel = format!("{}/{}", LICENSE_DIR, name);
                (rel.clone(), rel)
            })
            .collect();
        collab.files.copy_files(&repo.root, &ctx.tree_root, &mapping)?;
        debug!("{}: {} licenses from {}", ctx.name(), found.len(), repo.name);
        for name in found {
            missing.remove(&name);
            copied.insert(name, repo.name.clone());
        }
    }

    if !missing.is_empty() {
        let searched: Vec<String> = ctx.sources.iter().map(|r| r.name.clone()).collect();
        return Err(Error::UnresolvedLicense {
            licenses: missing
                .into_iter()
                .map(|name| UnresolvedLicense {
                    name,
                    kit: ctx.name().to_string(),
                    searched: searched.clone(),
                })
                .collect(),
        });
    }
    info!("{}: {} licenses copied", ctx.name(), copied.len());
    Ok(copied)
}

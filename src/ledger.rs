//! The exclusivity ledger shared by every kit of a generation scope.
//!
//! Once a package is claimed by a kit it cannot be selected again until the
//! scope is reset. Fix-up packages are recorded separately: they neither need
//! nor consume a claim.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::package::PackageId;

#[derive(Debug, Default, Clone)]
pub struct ExclusivityLedger {
    claims: BTreeMap<PackageId, String>,
    fixups: BTreeMap<PackageId, BTreeSet<String>>,
    /// Claims from earlier scopes, kept for the run report only.
    history: Vec<BTreeMap<PackageId, String>>,
}

impl ExclusivityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for `kit`. Returns `false` when it is already claimed in
    /// this scope (by any kit, including `kit` itself).
    pub fn claim(&mut self, id: PackageId, kit: &str) -> bool {
        if self.claims.contains_key(&id) {
            return false;
        }
        self.claims.insert(id, kit.to_string());
        true
    }

    pub fn is_claimed(&self, id: &PackageId) -> bool {
        self.claims.contains_key(id)
    }

    pub fn owner(&self, id: &PackageId) -> Option<&str> {
        self.claims.get(id).map(String::as_str)
    }

    /// Record a fix-up package placed into `kit`, bypassing exclusivity.
    pub fn record_fixup(&mut self, id: PackageId, kit: &str) {
        self.fixups.entry(id).or_default().insert(kit.to_string());
    }

    pub fn is_fixup(&self, id: &PackageId, kit: &str) -> bool {
        self.fixups.get(id).is_some_and(|kits| kits.contains(kit))
    }

    /// Packages claimed by `kit` in the current scope.
    pub fn claimed_by(&self, kit: &str) -> BTreeSet<PackageId> {
        self.claims
            .iter()
            .filter(|(_, owner)| owner.as_str() == kit)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The complement of the ledger over `universe`: what a catch-all kit
    /// may still take.
    pub fn unclaimed<'a, I>(&self, universe: I) -> BTreeSet<PackageId>
    where
        I: IntoIterator<Item = &'a PackageId>,
    {
        universe
            .into_iter()
            .filter(|id| !self.claims.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Clear every claim. Called at scope boundaries only.
    pub fn reset(&mut self) {
        let previous = std::mem::take(&mut self.claims);
        self.history.push(previous);
    }

    pub fn report(&self) -> LedgerReport {
        let mut scopes = Vec::new();
        for claims in self.history.iter().chain(std::iter::once(&self.claims)) {
            let mut kits: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (id, kit) in claims {
                kits.entry(kit.clone()).or_default().push(id.to_string());
            }
            scopes.push(ScopeReport { kits });
        }
        let fixups = self
            .fixups
            .iter()
            .map(|(id, kits)| (id.to_string(), kits.iter().cloned().collect()))
            .collect();
        LedgerReport { scopes, fixups }
    }
}

#[derive(Debug, Serialize)]
pub struct ScopeReport {
    pub kits: BTreeMap<String, Vec<String>>,
}

/// Serializable summary of a run: claims per scope and fix-up overrides.
#[derive(Debug, Serialize)]
pub struct LedgerReport {
    pub scopes: Vec<ScopeReport>,
    pub fixups: BTreeMap<String, Vec<String>>,
}

impl LedgerReport {
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

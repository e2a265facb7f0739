//! # Generate Command Implementation
//!
//! Runs a full generation: every kit of the definitions in order, then
//! publishing. With `--no-push` nothing leaves the machine: missing kit
//! trees are created fresh and commits stay local.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use kit_merge::cache::Egencache;
use kit_merge::config::GenerationConfig;
use kit_merge::defaults::EGENCACHE_ENV;
use kit_merge::filesystem::LocalFileSync;
use kit_merge::generation::{Generation, GenerationOptions};
use kit_merge::phases::Collaborators;
use kit_merge::repository::DefaultVcsOperations;
use kit_merge::settings::Settings;

/// Generate kits from the generation definitions
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Generation definitions (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Do not push; create missing kit trees locally
    #[arg(long)]
    pub no_push: bool,

    /// Write the exclusivity ledger report (JSON) to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Only generate the named kit (repeatable). Other kits still claim
    /// their packages.
    #[arg(long = "kit", value_name = "NAME")]
    pub kits: Vec<String>,

    /// Metadata cache generator
    #[arg(long, value_name = "PROGRAM", env = EGENCACHE_ENV, default_value = "egencache")]
    pub egencache: String,
}

/// Execute the `generate` command.
pub fn execute(args: GenerateArgs, settings_path: Option<&Path>) -> Result<()> {
    let settings = Settings::locate(settings_path)?;
    let mut config = GenerationConfig::load(&args.config)?;
    config.apply_settings(&settings)?;

    for kit in &args.kits {
        let known = config.groups.values().flatten().any(|k| k.name == *kit);
        if !known {
            anyhow::bail!("--kit names unknown kit {}", kit);
        }
    }

    let vcs = DefaultVcsOperations;
    let cache = Egencache {
        program: args.egencache,
        ..Egencache::default()
    };
    let collab = Collaborators {
        vcs: &vcs,
        files: &LocalFileSync,
        cache: &cache,
    };
    let options = GenerationOptions {
        push: !args.no_push,
        kits: args.kits,
        report: args.report,
    };

    let summary = Generation::new(&config, &settings, collab, options)
        .run()
        .with_context(|| format!("generation from {} failed", args.config.display()))?;

    for kit in &summary.kits {
        let status = kit.commit.as_deref().unwrap_or("unchanged");
        println!(
            "{} ({}): {} packages, {} fix-ups, {}",
            kit.kit,
            kit.branch,
            kit.selection.packages().len(),
            kit.fixups.packages.len(),
            status
        );
    }
    info!(
        "Generated {} kits, published {}",
        summary.kits.len(),
        summary.published.len()
    );
    Ok(())
}

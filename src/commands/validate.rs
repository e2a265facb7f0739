//! # Validate Command Implementation
//!
//! Parses the generation definitions and checks every cross reference:
//! kit sources, pins, groups, the generation order and the repositories
//! steps refer to. Package-set files are loaded to catch bad patterns.
//!
//! This command is read-only and never touches a repository.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use kit_merge::config::{GenerationConfig, Sequenced};

/// Validate generation definitions
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Generation definitions (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = GenerationConfig::load(&args.config)?;
    config.validate()?;

    let mut scope = 1;
    let mut kits = 0;
    println!("Definitions: {}", args.config.display());
    println!("Scope {}:", scope);
    for item in config.sequence() {
        match item {
            Sequenced::Reset => {
                scope += 1;
                println!("Scope {}:", scope);
            }
            Sequenced::Kit { group, kit } => {
                config
                    .package_set(kit)
                    .with_context(|| format!("package set of kit {}", kit.name))?;
                let mut flags = Vec::new();
                if kit.catch_all {
                    flags.push("catch-all");
                }
                if kit.all_eclasses {
                    flags.push("all eclasses");
                }
                if kit.publish {
                    flags.push("published");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                };
                println!("  {}/{} {} from {}{}", group, kit.name, kit.branch, kit.source, flags);
                kits += 1;
            }
        }
    }
    println!(
        "OK: {} kits, {} groups, {} repositories",
        kits,
        config.groups.len(),
        config.repositories.len()
    );
    Ok(())
}

//! # CLI Command Implementations
//!
//! Each subcommand of `kit-merge` lives in its own file with an `Args`
//! struct derived using `clap` and an `execute` function that calls into
//! the `kit_merge` library.

pub mod generate;
pub mod validate;

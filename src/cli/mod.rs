//! Command-line interface definitions.
//!
//! - `Cli`, `Commands`: argument definitions via clap
//! - `Display`: styled terminal tables and status lines

mod commands;
mod display;

pub use commands::{Cli, Commands, ConfigAction, OutputFormat};
pub use display::Display;

//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the loader using `clap`.
//! It handles parsing arguments like the input module, the target family and
//! what to do with the module once it is open.

use clap::Parser;
use std::path::PathBuf;

use crate::arch::TargetFamily;

/// A dynamic loader for TI DSP DOFF modules.
///
/// Without `--section` or `--load` the section table is listed. `--section`
/// copies one unrelocated section out of the file, and `--load` places and
/// relocates the whole module into a flat memory image.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input DOFF module
    pub input: PathBuf,

    /// Target family (detected from the file header when omitted)
    #[arg(short, long, value_enum)]
    pub target: Option<TargetFamily>,

    /// Copy the named section to the output
    #[arg(short, long, conflicts_with = "load")]
    pub section: Option<String>,

    /// Output file (standard output when omitted)
    #[arg(short, long, help = "Path to write section data or the loaded image to")]
    pub output: Option<PathBuf>,

    /// Load the module into a memory image
    #[arg(long)]
    pub load: bool,

    /// Target address the memory image starts at
    #[arg(long, default_value = "0", value_parser = parse_address)]
    pub base: u32,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

/// Accept decimal or `0x`-prefixed hexadecimal addresses.
pub fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

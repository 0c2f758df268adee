use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::utils::types::Address;

/// A cooperative DNS cache node on a Chord ring.
#[derive(Parser, Debug)]
#[command(name = "chord-dns")]
pub struct Cli {
    /// Address to bind the gRPC service to, host:port
    #[arg(long)]
    pub bind: Address,

    /// Address of any ring member to join through; omit to start a new ring
    #[arg(long)]
    pub peer: Option<Address>,

    /// INI file with ring/cache/timing overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}

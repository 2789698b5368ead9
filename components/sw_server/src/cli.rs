//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

/// Service worker emulation proxy
#[derive(Parser, Debug)]
#[command(name = "swemu")]
#[command(author, version, about = "Runs a service worker in front of a live HTTP origin", long_about = None)]
pub struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Origin the worker believes it serves [default: http://localhost:<port>]
    #[arg(long)]
    pub origin: Option<String>,

    /// Upstream base URL unhandled requests are proxied to
    #[arg(long)]
    pub network: String,

    /// Worker source file
    #[arg(short, long)]
    pub worker: PathBuf,

    /// Limit for a claimed install event, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub install_timeout_ms: u64,

    /// Limit for a claimed activate event, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub activate_timeout_ms: u64,

    /// Limit for a claimed fetch event, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub respond_timeout_ms: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Do not reload the worker when its file changes
    #[arg(long)]
    pub no_watch: bool,
}

// src/main.rs
//! continuum-inspect
//!
//! Prints a codec-independent summary of a capture container: header fields,
//! the type table and optionally every frame.

use anyhow::{Context, Result};
use clap::Parser;
use continuum::io::{inspect, ByteChannel, ContainerSummary};
use continuum::observability::init_tracing;
use continuum::utils::config::ContinuumConfig;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "continuum-inspect", version, about = "Inspect a Continuum capture container")]
struct Args {
    /// Capture file to inspect
    path: PathBuf,

    /// List every frame
    #[arg(long)]
    frames: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ContinuumConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;
    debug!("Configuration loaded: {:?}", config);

    let channel = ByteChannel::open_read_only(&args.path)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;
    let summary = inspect(&channel, args.frames)
        .with_context(|| format!("{} is not a capture container", args.path.display()))?;

    if summary.trailing_bytes > 0 {
        warn!("{} bytes after the last complete frame", summary.trailing_bytes);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &ContainerSummary) {
    println!("version   {}", summary.version);
    println!("created   {}", summary.created.to_rfc3339());
    println!("records   {}", summary.count);
    println!("duration  {} ms", summary.duration_ms);
    println!("types     {}", summary.types.len());

    for entry in &summary.types {
        println!("  {:>5}  {}", entry.code, entry.type_id);
    }

    if !summary.frames.is_empty() {
        println!();
        println!("{:>8}  {:>10}  {:>5}  {:>8}  timestamp", "index", "offset", "code", "bytes");
        for frame in &summary.frames {
            println!(
                "{:>8}  {:>10}  {:>5}  {:>8}  {}",
                frame.index,
                frame.offset,
                frame.code,
                frame.payload_len,
                frame.timestamp.to_rfc3339()
            );
        }
    }

    if summary.trailing_bytes > 0 {
        println!("truncated tail: {} bytes", summary.trailing_bytes);
    }
}

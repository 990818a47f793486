use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dflog_core::{new_counter, DataFlashReader};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "dflog", about = "ArduPilot DataFlash (.bin) log reader CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show basic log information: record counts by type, vehicle type, flight mode.
    Info {
        file: PathBuf,
        /// Treat the bootstrap time base as zero instead of anchoring to the
        /// log's first GPS fix.
        #[arg(long)]
        zero_time_base: bool,
    },

    /// Dump every record of one type as newline-delimited JSON.
    Dump {
        file: PathBuf,
        #[arg(short, long)]
        r#type: String,
        #[arg(long)]
        zero_time_base: bool,
    },

    /// Stream every record in the log as newline-delimited JSON.
    Messages {
        file: PathBuf,
        #[arg(long)]
        zero_time_base: bool,
    },

    /// Summarize record counts across multiple log files in parallel.
    BatchInfo { files: Vec<PathBuf> },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { file, zero_time_base } => run_info(&file, zero_time_base),
        Commands::Dump { file, r#type, zero_time_base } => run_dump(&file, &r#type, zero_time_base),
        Commands::Messages { file, zero_time_base } => run_messages(&file, zero_time_base),
        Commands::BatchInfo { files } => run_batch_info(&files),
    }
}

fn run_info(file: &PathBuf, zero_time_base: bool) -> Result<()> {
    let mut reader = DataFlashReader::open(file, zero_time_base)
        .with_context(|| format!("opening {}", file.display()))?;

    let mut counts: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    while let Some(record) = reader.next()? {
        *counts.entry(record.type_name().to_string()).or_insert(0) += 1;
    }

    println!("vehicle type: {:?}", reader.mav_type());
    println!("flight mode: {}", reader.flight_mode());
    println!("record types: {}", counts.len());

    let mut rows: Vec<(String, u64)> = counts.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    for (type_name, count) in rows {
        println!("  {type_name:>8}  {count}");
    }
    Ok(())
}

fn run_dump(file: &PathBuf, type_name: &str, zero_time_base: bool) -> Result<()> {
    let mut reader = DataFlashReader::open(file, zero_time_base)
        .with_context(|| format!("opening {}", file.display()))?;

    while let Some(record) = reader.next()? {
        if record.type_name() == type_name {
            let map = record.as_map();
            println!("{}", serde_json::to_string(&map)?);
        }
    }
    Ok(())
}

/// Print the last-seen-by-type snapshot (`reader.messages()`), one JSON
/// line per type, after fully draining the stream.
fn run_messages(file: &PathBuf, zero_time_base: bool) -> Result<()> {
    let mut reader = DataFlashReader::open(file, zero_time_base)
        .with_context(|| format!("opening {}", file.display()))?;

    while reader.next()?.is_some() {}

    let mut rows: Vec<(&String, &dflog_core::Record)> = reader.messages().iter().collect();
    rows.sort_by_key(|(name, _)| name.as_str());
    for (_, record) in rows {
        let map = record.as_map();
        println!("{}", serde_json::to_string(&map)?);
    }
    Ok(())
}

/// Count records per file in parallel, reporting progress via the shared
/// counter the way the workspace's other batch commands do.
fn run_batch_info(files: &[PathBuf]) -> Result<()> {
    let counter = new_counter();
    let results: Vec<Result<(String, u64)>> = files
        .par_iter()
        .map(|path| {
            let mut reader = DataFlashReader::open(path, false)
                .with_context(|| format!("opening {}", path.display()))?;
            let mut n = 0u64;
            while reader.next()?.is_some() {
                n += 1;
            }
            counter.fetch_add(1, Ordering::Relaxed);
            Ok((path.display().to_string(), n))
        })
        .collect();

    for result in results {
        match result {
            Ok((name, n)) => println!("{name}: {n} records"),
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    log::info!("processed {} file(s)", counter.load(Ordering::Relaxed));
    Ok(())
}

//! provlog CLI
//!
//! Operator commands for inspecting and maintaining a log file.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use provlog::index::MemoryIndex;
use provlog::log::{LogReader, Recovery, RecoveryResult};
use provlog::{Config, Engine, LineageResolver, LogError, OffsetIndex};
use tracing_subscriber::{fmt, EnvFilter};

/// provlog CLI
#[derive(Parser, Debug)]
#[command(name = "provlog-cli")]
#[command(about = "Inspect and maintain a provlog append-only log")]
#[command(version)]
struct Args {
    /// Log file
    #[arg(short, long)]
    log: PathBuf,

    /// Index snapshot file to rebuild (in-memory index when omitted)
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// Largest frame accepted, in bytes
    #[arg(long, default_value = "16777216")]
    max_frame_size: u32,

    /// Most frames a lineage query may read
    #[arg(long, default_value = "1000000")]
    max_lineage_hops: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the log without modifying it and report what recovery would keep
    Verify,

    /// Print the size of the durable prefix, leaving the file untouched
    Stats,

    /// Print one entry read from disk
    Show {
        /// Sequence number of the entry
        sequence: u64,
    },

    /// Print the ancestors of an entry, one per path
    Lineage {
        /// Sequence number of the entry
        sequence: u64,
    },

    /// Rebuild the offset index from the log (cuts any torn tail first)
    RebuildIndex,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,provlog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> provlog::Result<()> {
    tracing::debug!("provlog v{}", provlog::VERSION);

    match args.command {
        Commands::Verify => verify(&args),
        Commands::Stats => stats(&args),
        Commands::Show { sequence } => show(&args, sequence),
        Commands::Lineage { sequence } => lineage(&args, sequence),
        Commands::RebuildIndex => rebuild_index(&args),
    }
}

// =============================================================================
// Read-only commands
// =============================================================================

/// The durable prefix of a log, replayed without writing to the file
struct Snapshot {
    result: RecoveryResult,
    index: MemoryIndex,
}

impl Snapshot {
    fn load(args: &Args) -> provlog::Result<Self> {
        let (entries, result) = Recovery::replay(&args.log, args.max_frame_size)?;

        let index = MemoryIndex::new();
        for entry in &entries {
            if let Some(offset) = entry.offset() {
                index.put(entry.sequence_number(), offset)?;
            }
        }

        Ok(Self { result, index })
    }

    fn reader(&self, args: &Args) -> provlog::Result<LogReader> {
        Ok(LogReader::open(&args.log, args.max_frame_size)?.with_limit(self.result.durable_len))
    }

    fn offset_of(&self, sequence: u64) -> provlog::Result<u64> {
        self.index
            .get(sequence)?
            .ok_or(LogError::UnknownSequence(sequence))
    }
}

fn verify(args: &Args) -> provlog::Result<()> {
    let result = Recovery::verify(&args.log, args.max_frame_size)?;
    print_result(&result);
    Ok(())
}

fn stats(args: &Args) -> provlog::Result<()> {
    let snapshot = Snapshot::load(args)?;
    print_result(&snapshot.result);
    if snapshot.result.was_truncated {
        println!("(torn tail left in place; opening for writes will cut it)");
    }
    Ok(())
}

fn show(args: &Args, sequence: u64) -> provlog::Result<()> {
    let snapshot = Snapshot::load(args)?;
    let offset = snapshot.offset_of(sequence)?;
    let entry = snapshot.reader(args)?.read_entry_at(offset)?;

    println!("sequence:  {}", entry.sequence_number());
    println!("offset:    {:?}", entry.offset());
    println!("payload:   {} bytes", entry.payload().len());
    for reference in entry.references() {
        println!(
            "reference: {} -> entry {} @ {}",
            reference.relation_type,
            reference.target_sequence_number,
            reference.target_offset
        );
    }
    Ok(())
}

fn lineage(args: &Args, sequence: u64) -> provlog::Result<()> {
    let snapshot = Snapshot::load(args)?;
    snapshot.offset_of(sequence)?;

    let reader = snapshot.reader(args)?;
    let ancestors =
        LineageResolver::new(&snapshot.index, reader, args.max_lineage_hops).lineage(sequence)?;
    for ancestor in ancestors {
        println!("{}", ancestor);
    }
    Ok(())
}

fn print_result(result: &RecoveryResult) {
    println!("entries:        {}", result.entries_recovered);
    println!("last sequence:  {:?}", result.last_sequence);
    println!("durable bytes:  {}", result.durable_len);
    println!("file bytes:     {}", result.file_len);
    println!("torn tail:      {} bytes", result.discarded_bytes());
}

// =============================================================================
// Maintenance
// =============================================================================

fn rebuild_index(args: &Args) -> provlog::Result<()> {
    let mut builder = Config::builder()
        .log_path(&args.log)
        .create_if_missing(false)
        .max_frame_size(args.max_frame_size)
        .max_lineage_hops(args.max_lineage_hops);
    if let Some(index) = &args.index {
        builder = builder.index_path(index);
    }

    let engine = Engine::open(builder.build())?;
    let count = engine.rebuild_index()?;
    println!("indexed {} entries", count);
    engine.close()
}

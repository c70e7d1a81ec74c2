//! ledgerstore Inspect Binary
//!
//! Formats a data file, prints its recovered root state, or verifies it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledgerstore::storage::{FileStorage, Storage};
use ledgerstore::superblock::SuperBlock;
use ledgerstore::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// ledgerstore operator tool
#[derive(Parser, Debug)]
#[command(name = "ledgerstore-inspect")]
#[command(about = "Format, inspect and verify ledgerstore data files")]
#[command(version)]
struct Args {
    /// Data file
    #[arg(short, long, default_value = "./ledgerstore.data")]
    data_path: PathBuf,

    /// Cluster id the file belongs to
    #[arg(short, long, default_value = "0")]
    cluster: u128,

    /// Replica index within the cluster
    #[arg(short, long, default_value = "0")]
    replica: u8,

    /// Number of replicas in the cluster
    #[arg(long, default_value = "1")]
    replica_count: u8,

    /// Grid blocks (fixed at format time)
    #[arg(short, long, default_value = "4096")]
    grid_blocks: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and format a new data file
    Format,

    /// Print every superblock slot, journal replay and tree shapes
    Inspect,

    /// Recover the file and check manifest and free-set consistency
    Verify,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerstore=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::info!("ledgerstore-inspect v{}", ledgerstore::VERSION);

    let config = Config::builder()
        .data_path(&args.data_path)
        .cluster(args.cluster, args.replica, args.replica_count)
        .grid_block_count(args.grid_blocks)
        .build();

    let outcome = match args.command {
        Commands::Format => format(config),
        Commands::Inspect => inspect(config),
        Commands::Verify => verify(config),
    };
    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn format(config: Config) -> ledgerstore::Result<()> {
    let path = config.data_path.clone();
    let engine = Engine::format_path(config)?;
    println!(
        "formatted {} ({} bytes, {} trees)",
        path.display(),
        engine.superblock().layout().total_size(),
        engine.forest().trees().count()
    );
    Ok(())
}

fn inspect(config: Config) -> ledgerstore::Result<()> {
    let layout = config.layout();
    let storage = FileStorage::open(&config.data_path, layout.total_size())?;
    println!("device: {} ({} bytes)", config.data_path.display(), storage.size());

    println!("superblock slots:");
    for read in SuperBlock::read_slots(&storage, &layout)? {
        match read.header {
            Ok(header) => println!(
                "  slot {}: sequence {} checkpoint_op {} view {} manifest {}:{} free_set {} words",
                read.slot,
                header.sequence,
                header.checkpoint_op(),
                header.vsr.view,
                header.manifest.half,
                header.manifest.length,
                header.free_set.len()
            ),
            Err(e) => println!("  slot {}: invalid ({})", read.slot, e),
        }
    }

    let engine = Engine::open_path(config)?;
    println!(
        "durable_op {} commit_op {}",
        engine.durable_op(),
        engine.commit_op()
    );
    if let Some(report) = engine.recovery() {
        println!(
            "journal: {} records replayed after op {}, stop {:?}",
            report.entries_recovered, report.from_op, report.stop
        );
    }
    let free_set = engine.forest().grid().free_set();
    println!(
        "grid: {} of {} blocks in use, {} staged",
        free_set.acquired_count(),
        free_set.block_count(),
        free_set.staged_count()
    );
    for tree in engine.forest().trees() {
        let stats = tree.stats();
        println!(
            "tree {} ({}): buffer {} levels {:?}",
            stats.tree,
            tree.name(),
            stats.buffer_entries,
            stats.tables_per_level
        );
    }
    Ok(())
}

fn verify(config: Config) -> ledgerstore::Result<()> {
    let engine = Engine::open_path(config)?;
    engine.verify()?;
    println!(
        "ok: {} tables, durable_op {}",
        engine.forest().table_count(),
        engine.durable_op()
    );
    Ok(())
}

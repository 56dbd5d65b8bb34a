//! TierKV CLI
//!
//! Command-line interface that opens a data directory and runs one engine
//! operation against it.

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tierkv::{Config, Engine, ReadBackend, TierError};
use tracing_subscriber::{fmt, EnvFilter};

/// TierKV CLI
#[derive(Parser, Debug)]
#[command(name = "tierkv")]
#[command(about = "Embeddable LSM key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./tierkv_data")]
    data_dir: String,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "4")]
    memtable_mb: usize,

    /// How SSTables are read
    #[arg(long, value_enum, default_value_t = Backend::Buffered)]
    backend: Backend,

    /// Open even if a WAL segment lost acknowledged records
    #[arg(long)]
    tolerate_wal_data_loss: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Buffered,
    Mmap,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// Print live pairs in [from, to)
    Scan {
        /// Inclusive lower bound
        #[arg(long)]
        from: Option<String>,

        /// Exclusive upper bound
        #[arg(long)]
        to: Option<String>,

        /// Stop after this many pairs
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Write the memtable to an SSTable
    Flush,

    /// Merge all SSTables into one
    Compact,

    /// Print engine counters
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tierkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .read_backend(match args.backend {
            Backend::Buffered => ReadBackend::Buffered,
            Backend::Mmap => ReadBackend::Mmap,
        })
        .tolerate_wal_data_loss(args.tolerate_wal_data_loss)
        .try_build();

    let engine = match config.and_then(Engine::open) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    let result = run(&engine, args.command).and_then(|()| engine.close());
    if let Err(e) = result {
        tracing::error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> Result<(), TierError> {
    match command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Delete { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan { from, to, limit } => {
            let pairs = engine.range(
                from.as_deref().map(str::as_bytes),
                to.as_deref().map(str::as_bytes),
            )?;
            for pair in pairs.take(limit.unwrap_or(usize::MAX)) {
                let (key, value) = pair?;
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Flush => {
            engine.flush()?;
            println!("OK");
        }
        Commands::Compact => {
            engine.compact()?;
            println!("OK");
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!("memtable_size       {}", stats.memtable_size);
            println!("memtable_entries    {}", stats.memtable_entries);
            println!("flushing            {}", stats.flushing);
            println!("sstable_count       {}", stats.sstable_count);
            println!("sstable_entries     {}", stats.sstable_entries);
            println!("sstable_bytes       {}", stats.sstable_bytes);
            println!("active_generation   {}", stats.active_generation);
        }
    }
    Ok(())
}

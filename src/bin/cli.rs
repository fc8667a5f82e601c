//! tradestore CLI
//!
//! Inspect and edit a store directory in-process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use tradestore::{Config, ScanIterator, Store};

/// tradestore CLI
#[derive(Parser, Debug)]
#[command(name = "tradestore-cli")]
#[command(about = "Inspect and edit a tradestore directory")]
#[command(version)]
struct Args {
    /// Store directory
    #[arg(short, long, default_value = "/tmp/tradingstore")]
    store: PathBuf,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "4")]
    memtable_mb: usize,

    #[command(subcommand)]
    command: Commands,
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
    Del {
        /// The key to delete
        key: String,
    },

    /// List keys in [start, end); empty bounds are open
    Scan {
        #[arg(default_value = "")]
        start: String,

        #[arg(default_value = "")]
        end: String,
    },

    /// List keys starting with a prefix
    Prefix {
        prefix: String,
    },

    /// Merge all SSTables into one
    Compact,
}

fn main() {
    // Logs go to stderr so values on stdout stay pipeable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tradestore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> tradestore::Result<()> {
    let config = Config::builder()
        .data_dir(&args.store)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .build();
    let store = Store::open_with_config(config)?;

    match args.command {
        Commands::Get { key } => match store.get(&key) {
            Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
            Err(e) if e.is_not_found() => println!("(nil)"),
            Err(e) => return Err(e),
        },
        Commands::Put { key, value } => {
            store.put(&key, &value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(&key)?;
            println!("OK");
        }
        Commands::Scan { start, end } => print_entries(store.range_scan(&start, &end)?)?,
        Commands::Prefix { prefix } => print_entries(store.prefix_scan(&prefix)?)?,
        Commands::Compact => {
            store.compact()?;
            let stats = store.stats();
            println!("OK ({} sstables)", stats.sstable_count);
        }
    }

    store.close()
}

fn print_entries(iter: ScanIterator) -> tradestore::Result<()> {
    let entries = iter.collect_remaining()?;
    for (key, value) in &entries {
        println!(
            "{}\t{}",
            String::from_utf8_lossy(key),
            String::from_utf8_lossy(value)
        );
    }
    println!("({} entries)", entries.len());
    Ok(())
}

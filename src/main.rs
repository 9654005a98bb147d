use clap::Parser;
use lending_core::application::lending::LendingCore;
use lending_core::config::LendingConfig;
use lending_core::domain::ports::CoordinationStoreRef;
use lending_core::infrastructure::coordination::InMemoryCoordinationStore;
use lending_core::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use lending_core::infrastructure::rocksdb::RocksDBStore;
use lending_core::interfaces::csv::limit_writer::LimitWriter;
use lending_core::interfaces::csv::operation_reader::OperationReader;
use lending_core::interfaces::replay::Replay;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON file overriding lock, retry and pricing settings
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LendingConfig::from_path(path).into_diagnostic()?,
        None => LendingConfig::default(),
    };

    // Locks only need to be shared between the tasks of this process here;
    // a multi-node deployment plugs a networked CoordinationStore in instead.
    let coordination: CoordinationStoreRef = Arc::new(InMemoryCoordinationStore::new());

    let core = match cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            LendingCore::new(store, coordination, &config)
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            LendingCore::new(InMemoryStore::new(), coordination, &config)
        }
        None => LendingCore::new(InMemoryStore::new(), coordination, &config),
    };

    // Replay operations
    let replay = Replay::new(&core);
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for op_result in reader.operations() {
        match op_result {
            Ok(op) => {
                if let Err(e) = replay.apply(op).await {
                    eprintln!("Error processing operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {}", e);
            }
        }
    }

    // Output final limits
    let limits = replay.limits().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = LimitWriter::new(stdout.lock());
    writer.write_limits(limits).into_diagnostic()?;

    Ok(())
}

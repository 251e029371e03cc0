//! Strata load driver
//!
//! Pushes mutations through a client backed by a local batch log, and reads
//! such logs back.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use strata::submitter::{BatchLogReader, LogSubmitter};
use strata::topology::{ClusterMetadataWatcher, MemoryCoordination};
use strata::{Client, ClientConfig, Mutation, OperationState};
use tracing_subscriber::{fmt, EnvFilter};

/// Strata load driver
#[derive(Parser, Debug)]
#[command(name = "strata-load")]
#[command(about = "Drive buffered writes through a Strata client")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write mutations and report how they settled
    Run {
        /// Batch log to append to
        #[arg(short, long, default_value = "./strata_data/batches.log")]
        log: PathBuf,

        /// Number of tables to spread writes over
        #[arg(short, long, default_value = "4")]
        tables: usize,

        /// Total mutations to write
        #[arg(short = 'n', long, default_value = "10000")]
        mutations: usize,

        /// Per-table mutation count that forces a flush
        #[arg(long, default_value = "500")]
        max_buffered: usize,

        /// Max buffering delay in milliseconds
        #[arg(long, default_value = "100")]
        delay_ms: u64,

        /// Flush workers
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Root region server advertised by the in-process coordinator
        #[arg(long, default_value = "localhost:16020")]
        root_server: String,

        /// fsync the log after every batch
        #[arg(long)]
        sync: bool,
    },

    /// Print the batches recorded in a log
    Inspect {
        /// Batch log to read
        log: PathBuf,

        /// Print every mutation, not just batch summaries
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Run {
            log,
            tables,
            mutations,
            max_buffered,
            delay_ms,
            workers,
            root_server,
            sync,
        } => {
            let config = ClientConfig::builder()
                .max_buffered_count(max_buffered)
                .max_buffer_delay_ms(delay_ms)
                .worker_pool_size(workers)
                .build();
            run(config, log, tables.max(1), mutations, &root_server, sync)
        }
        Commands::Inspect { log, verbose } => inspect(log, verbose),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(
    config: ClientConfig,
    log: PathBuf,
    tables: usize,
    mutations: usize,
    root_server: &str,
    sync: bool,
) -> strata::Result<()> {
    tracing::info!("Strata v{}", strata::VERSION);
    tracing::info!("Batch log: {}", log.display());

    let coordination = Arc::new(MemoryCoordination::new());
    coordination.set_data(&config.root_region_path(), root_server.as_bytes().to_vec());
    let watcher = ClusterMetadataWatcher::start(coordination, &config);

    let submitter = Arc::new(LogSubmitter::open(&log, watcher.clone())?.with_sync(sync));
    let client = Client::with_watcher(config, submitter.clone(), watcher)?;

    let failed = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let mut operations = Vec::with_capacity(mutations);
    for i in 0..mutations {
        let table = format!("table-{}", i % tables);
        let mutation = Mutation::put(format!("row-{:08}", i))
            .column("cf", "value", format!("payload-{}", i));

        let operation = client.put(table, mutation)?;
        let failed = Arc::clone(&failed);
        operation.on_failure(move |e| {
            failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %e, "Write failed");
        });
        operations.push(operation);
    }

    let enqueued_in = started.elapsed();
    client.close();
    let total = started.elapsed();

    let succeeded = operations
        .iter()
        .filter(|op| op.state() == OperationState::Succeeded)
        .count();

    println!("mutations:   {}", mutations);
    println!("tables:      {}", tables);
    println!("succeeded:   {}", succeeded);
    println!("failed:      {}", failed.load(Ordering::Relaxed));
    println!("batches:     {}", submitter.batches_written());
    println!("enqueue ms:  {}", enqueued_in.as_millis());
    println!("total ms:    {}", total.as_millis());

    Ok(())
}

fn inspect(log: PathBuf, verbose: bool) -> strata::Result<()> {
    let batches = BatchLogReader::read_all(&log)?;

    for batch in &batches {
        println!(
            "{} batch={} mutations={} root={}",
            batch.table,
            batch.batch_id,
            batch.mutations.len(),
            batch.root_server.as_deref().unwrap_or("-")
        );

        if verbose {
            for mutation in &batch.mutations {
                println!(
                    "    {:?} row={} columns={}",
                    mutation.kind(),
                    String::from_utf8_lossy(mutation.row()),
                    mutation.columns().len()
                );
            }
        }
    }

    println!("{} batches", batches.len());
    Ok(())
}

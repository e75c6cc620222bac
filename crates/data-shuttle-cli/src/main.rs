//! data-shuttle CLI - chunked Oracle/PostgreSQL table migration.

use clap::{Parser, Subcommand};
use data_shuttle::{Config, MigrationEvent, Orchestrator, ShuttleError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "data-shuttle")]
#[command(about = "Chunked table-to-table migration between Oracle and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "shuttle.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured migration
    Run {
        /// Output the JSON result to stdout
        #[arg(long)]
        output_json: bool,
    },

    /// Test both configured database connections
    TestConnection {
        /// Per-connection timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ShuttleError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { output_json } => {
            let job = config.into_job()?;
            let (mut events, cancel, handle) = Orchestrator::new(job)?.spawn();

            // Ctrl-C requests a stop at the next chunk boundary.
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nCancellation requested, stopping at the next chunk boundary...");
                    let _ = cancel.send(true);
                }
            });

            while let Some(event) = events.recv().await {
                render_event(&event);
            }

            let result = handle
                .await
                .map_err(|e| ShuttleError::connectivity(format!("migration task failed: {}", e)))?;

            if output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration finished: {:?}", result.status);
                println!("  Tables: {}", result.tables.len());
                println!(
                    "  Rows: {}/{}",
                    result.inserted_total, result.source_total
                );
            }

            if result.failed() {
                return Err(ShuttleError::connectivity(
                    "migration failed before any table was attempted",
                ));
            }
        }

        Commands::TestConnection { timeout } => {
            let timeout = Duration::from_secs(timeout);
            let (source_ok, source_msg) =
                data_shuttle::test_connection(&config.source, timeout).await;
            let (dest_ok, dest_msg) = data_shuttle::test_connection(&config.dest, timeout).await;

            println!(
                "  Source: {} - {}",
                if source_ok { "OK" } else { "FAILED" },
                source_msg
            );
            println!(
                "  Destination: {} - {}",
                if dest_ok { "OK" } else { "FAILED" },
                dest_msg
            );

            if !source_ok || !dest_ok {
                return Err(ShuttleError::connectivity("connection test failed"));
            }
        }
    }

    Ok(())
}

fn render_event(event: &MigrationEvent) {
    match event {
        MigrationEvent::Log { message } => info!("{}", message),
        MigrationEvent::Progress {
            inserted_total,
            source_total,
        } => info!("progress: {}/{} rows", inserted_total, source_total),
        MigrationEvent::Error { row_index, message } => {
            error!("row {}: {}", row_index, message)
        }
        MigrationEvent::Done {
            inserted_total,
            source_total,
        } => info!("done: {}/{} rows", inserted_total, source_total),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

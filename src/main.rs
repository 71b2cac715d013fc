//! Command-line interface for ghost-sync
//!
//! # Usage Examples
//!
//! ## Derived names
//! ```bash
//! ghost-sync names --database app --table users \
//!   --trigger-suffix _gho --remove-trigger-suffix-if-exists \
//!   --trigger users_ins --trigger users_upd
//! ```
//!
//! ## Tailing the binlog
//! ```bash
//! # Follow the shadow table, stop after 100 events
//! GHOST_SYNC_PASSWORD=secret ghost-sync tail \
//!   --host db1 --user ghost --database app --table users \
//!   --watch ghost --max-events 100
//!
//! # Resume where the last run stopped
//! ghost-sync tail --database app --table users --checkpoint-dir .checkpoints
//! ```
//!
//! ## Position Format
//! - Binlog position: `binlog.000003:1542` (file name and byte offset)

use clap::{Parser, Subcommand};
use ghost_sync::names::render_names;
use ghost_sync::tail::{run_tail, TailOpts};
use ghost_sync::{ConnectionOpts, NamingOpts};

#[derive(Parser)]
#[command(name = "ghost-sync")]
#[command(about = "Triggerless online schema migration tooling for MySQL")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the shadow, old and changelog table names and trigger names
    Names {
        #[command(flatten)]
        naming: NamingOpts,

        /// Trigger on the original table to derive a shadow trigger name for
        #[arg(long = "trigger", value_name = "NAME")]
        triggers: Vec<String>,
    },

    /// Print row changes of a migration table from the binlog
    Tail {
        #[command(flatten)]
        connection: ConnectionOpts,

        #[command(flatten)]
        naming: NamingOpts,

        #[command(flatten)]
        tail: TailOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Names { naming, triggers } => {
            let context = naming.to_context()?;
            print!("{}", render_names(&context, &triggers));
        }
        Commands::Tail {
            connection,
            naming,
            tail,
        } => {
            let config = connection.to_connection_config(&naming.database);
            let context = naming
                .to_context()?
                .with_inspector_connection_config(config.clone())
                .with_applier_connection_config(config);
            run_tail(context, tail).await?;
        }
    }

    Ok(())
}

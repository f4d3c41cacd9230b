mod commands;
mod setup;
mod telemetry;

use clap::{Parser, Subcommand, ValueEnum};
use vidcat_core::Config;
use vidcat_worker::EventStream;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "vidcat", about = "Video catalog event consumer and maintenance commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume both lifecycle event streams until interrupted
    Serve,
    /// Delete a catalog record and every stored object derived from it
    Delete {
        /// Catalog record id
        id: i64,
        /// Overall time budget; defaults to CATALOG_DELETE_DEADLINE_SECS
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Feed one lifecycle event from a JSON file into the catalog
    Ingest {
        /// Which stream the event belongs to
        stream: StreamArg,
        /// Path to the JSON event
        file: std::path::PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StreamArg {
    Registered,
    Finalized,
}

impl From<StreamArg> for EventStream {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Registered => EventStream::Registered,
            StreamArg::Finalized => EventStream::Finalized,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    telemetry::init_telemetry(std::env::var("LOG_FORMAT").ok().as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Serve => commands::serve(&config).await,
        Commands::Delete { id, deadline_secs } => {
            commands::delete(&config, id, deadline_secs).await
        }
        Commands::Ingest { stream, file } => commands::ingest(&config, stream.into(), &file).await,
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use ragserve::commands::{create_index, delete_index, ingest, list_indexes, serve};
use ragserve::config::Config;

#[derive(Parser)]
#[command(name = "ragserve")]
#[command(about = "A retrieval-augmented chat backend over a managed vector store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Ingest staged documents into an index
    Ingest {
        /// Target index (defaults to ACTIVE_INDEX)
        #[arg(long)]
        index: Option<String>,
        /// Fetch the document from INGEST_API_ENDPOINT instead of the staging directory
        #[arg(long)]
        remote: bool,
    },
    /// Create a vector index
    CreateIndex {
        /// Index name
        name: String,
        /// Vector dimension (defaults to the embedding model's dimension)
        #[arg(long)]
        dimension: Option<usize>,
    },
    /// List all vector indexes
    ListIndexes,
    /// Delete a vector index
    DeleteIndex {
        /// Index name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => serve(config, port).await?,
        Commands::Ingest { index, remote } => ingest(&config, index, remote)?,
        Commands::CreateIndex { name, dimension } => create_index(&config, &name, dimension)?,
        Commands::ListIndexes => list_indexes(&config)?,
        Commands::DeleteIndex { name } => delete_index(&config, &name)?,
    }

    Ok(())
}

//! CLI wiring for the artifact cache.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use kiln::{CancelToken, Error, Result};
use kiln_store::{
    ArtifactCache, ArtifactFetcher, ArtifactLoader, ArtifactMetadata, ModelSource, SqliteStore,
};

const MIB: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "kiln", about = "Chunked model artifact cache", version)]
pub struct Cli {
    /// SQLite database holding cached artifacts
    #[arg(long, env = "KILN_CACHE_DB")]
    pub db: Option<PathBuf>,

    /// Chunk size for newly stored artifacts, in MiB
    #[arg(long, env = "KILN_CHUNK_SIZE_MIB", default_value_t = 50)]
    pub chunk_size_mib: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the model through the cache, downloading it on a miss.
    Pull {
        /// JSON manifest with `name`, `graph_url` and `weights_url`
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Print the cached metadata records of the model.
    Inspect {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Remove the model's artifacts from the cache.
    ClearCache {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

impl Cli {
    fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(default_db_path)
    }

    fn chunk_size_bytes(&self) -> Result<usize> {
        self.chunk_size_mib.checked_mul(MIB).ok_or_else(|| {
            Error::InvalidConfig(format!("chunk size of {} MiB is too large", self.chunk_size_mib))
        })
    }
}

/// `$XDG_CACHE_HOME/kiln/artifacts.sqlite`, falling back to `~/.cache`.
fn default_db_path() -> PathBuf {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("kiln").join("artifacts.sqlite")
}

fn load_source(manifest: Option<&PathBuf>) -> Result<ModelSource> {
    match manifest {
        Some(path) => ModelSource::from_file(path),
        None => Ok(ModelSource::phi3_mini_web()),
    }
}

pub async fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let db = cli.db_path();
    let store = SqliteStore::open(&db)?;
    let cache = ArtifactCache::with_chunk_size(store, cli.chunk_size_bytes()?)?;
    let loader = ArtifactLoader::new(cache, ArtifactFetcher::new());
    info!(db = %db.display(), "using artifact cache");

    match &cli.command {
        Command::Pull { manifest } => {
            let source = load_source(manifest.as_ref())?;
            let cancel = CancelToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let artifacts = loader.load(&source, &cancel).await?;
            println!("Model:   {}", source.name);
            println!("Source:  {:?}", artifacts.origin);
            println!("Graph:   {:.1} MiB", mib(artifacts.graph.len()));
            println!("Weights: {:.1} MiB", mib(artifacts.weights.len()));
        }
        Command::Inspect { manifest } => {
            let source = load_source(manifest.as_ref())?;
            let (graph, weights) = loader.inspect(&source).await?;
            println!("Model: {}", source.name);
            print_metadata(&source.graph_artifact(), graph.as_ref());
            print_metadata(&source.weights_artifact(), weights.as_ref());
        }
        Command::ClearCache { manifest } => {
            let source = load_source(manifest.as_ref())?;
            loader.evict(&source).await?;
            println!("Cleared {} from {}", source.name, db.display());
        }
    }
    Ok(())
}

fn print_metadata(name: &str, metadata: Option<&ArtifactMetadata>) {
    match metadata {
        Some(m) => println!(
            "  {name}: {:.1} MiB in {} chunks (stored at {} ms)",
            mib_u64(m.total_size_bytes),
            m.chunk_count,
            m.created_at
        ),
        None => println!("  {name}: not cached"),
    }
}

#[allow(clippy::cast_precision_loss)]
fn mib(bytes: usize) -> f64 {
    bytes as f64 / MIB as f64
}

#[allow(clippy::cast_precision_loss)]
fn mib_u64(bytes: u64) -> f64 {
    bytes as f64 / MIB as f64
}

use clap::{Parser, Subcommand};
use docfetch_core::{
    connect_buckets, BucketPolicy, BucketStore, CatalogResolver, DocumentRetriever, LocalName,
    ObjectLocator, PathDescriptor, RetrievalConfig, RetrievalOutcome, SqliteCatalog,
};
use docfetch_files::DownloadStore;
use docfetch_types::DocumentId;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docfetch")]
#[command(about = "Document location and retrieval CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up the stored path of a document in the catalog
    Path {
        /// Document identifier
        id: String,
    },
    /// Parse a stored path string and show its bucket and object key
    Parse {
        /// Path string, e.g. `uuid|documento.externo|application/pdf|pdf`
        raw: String,
    },
    /// Show the bucket for a document type
    Bucket {
        /// Document type token, e.g. `documento.externo`
        document_type: String,
    },
    /// Download a document by identifier
    Fetch {
        /// Document identifier
        id: String,
        /// Destination directory (defaults to DOWNLOAD_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Local filename (defaults to the resolved object key)
        #[arg(long)]
        name: Option<String>,
    },
    /// List reachable buckets
    Buckets,
    /// List object keys in a bucket
    Objects {
        /// Bucket name
        bucket: String,
        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
}

fn load_config() -> anyhow::Result<RetrievalConfig> {
    let config = RetrievalConfig::from_env_values(|key| std::env::var(key).ok())?;
    config.log_summary();
    Ok(config)
}

fn connect_catalog(config: &RetrievalConfig) -> anyhow::Result<CatalogResolver> {
    let catalog = SqliteCatalog::connect(config.catalog_dsn())?;
    Ok(CatalogResolver::new(Arc::new(catalog)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docfetch=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Path { id }) => {
            let config = load_config()?;
            let catalog = connect_catalog(&config)?;
            let id = DocumentId::new(&id)?;
            match catalog.resolve_path(&id).await? {
                Some(path) => println!("{}", path),
                None => println!("No stored artifact for document {}", id),
            }
        }
        Some(Commands::Parse { raw }) => {
            let descriptor = PathDescriptor::parse(&raw)?;
            let bucket = BucketPolicy::new().resolve(descriptor.document_type());
            println!("uuid:          {}", descriptor.uuid());
            println!("document type: {}", descriptor.document_type());
            if let Some(mime) = descriptor.mime_type() {
                println!("mime type:     {}", mime);
            }
            println!("bucket:        {}", bucket);
            println!("object key:    {}", descriptor.object_key());
        }
        Some(Commands::Bucket { document_type }) => {
            let bucket = BucketPolicy::new().resolve(&document_type);
            if bucket.is_derived() {
                println!("{} (derived, not in table)", bucket);
            } else {
                println!("{}", bucket);
            }
        }
        Some(Commands::Fetch { id, dir, name }) => {
            let config = load_config()?;
            let catalog = connect_catalog(&config)?;
            catalog.ping().await?;
            let downloads =
                DownloadStore::new(dir.as_deref().unwrap_or_else(|| config.download_dir()))?;
            let retriever =
                DocumentRetriever::new(ObjectLocator::new(connect_buckets(&config)?), downloads)
                    .with_catalog(catalog);

            let name = name.map_or(LocalName::Key, LocalName::Exact);
            let result = retriever.retrieve(&DocumentId::new(&id)?, &name).await;
            match &result.outcome {
                RetrievalOutcome::Downloaded(document) => println!(
                    "Downloaded {}/{} to {}",
                    document.bucket,
                    document.object_key,
                    document.file.path.display()
                ),
                RetrievalOutcome::Skipped { reason } => println!("Skipped {}: {}", id, reason),
                RetrievalOutcome::Failed { kind, reason } => {
                    anyhow::bail!("failed to retrieve {} ({:?}): {}", id, kind, reason)
                }
            }
        }
        Some(Commands::Buckets) => {
            let config = load_config()?;
            let buckets = connect_buckets(&config)?.list_buckets().await?;
            if buckets.is_empty() {
                println!("No reachable buckets.");
            }
            for bucket in buckets {
                println!("{}", bucket);
            }
        }
        Some(Commands::Objects { bucket, prefix }) => {
            let config = load_config()?;
            let keys = connect_buckets(&config)?
                .list_keys(&bucket, prefix.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
        None => {
            println!("Use 'docfetch --help' for commands");
        }
    }

    Ok(())
}

use std::io::Read;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docfetch_core::{BatchItem, RetrievalConfig, batch_orchestrator, build_retriever};
use docfetch_types::DocumentId;

/// Main entry point for the docfetch batch runner
///
/// Reads document identifiers, one per line, from the file named by the first argument or
/// from stdin, downloads every document and prints the batch report as JSON on stdout.
/// Blank lines and lines starting with `#` are ignored.
///
/// # Environment Variables
/// - `CATALOG_DSN`: Catalog database (required)
/// - `OBJECT_STORE_ENDPOINT`, `OBJECT_STORE_ACCESS_KEY`, `OBJECT_STORE_SECRET_KEY`: Object store
/// - `DOWNLOAD_DIR`: Destination directory (default: "downloads")
/// - `RETRIEVAL_CONCURRENCY`: Documents retrieved at once (default: 1)
/// - `RETRIEVAL_TIMEOUT_SECS`: Per-document deadline, 0 or unset for none
///
/// # Returns
/// * `Ok(())` - If the batch ran, whatever the per-document outcomes
/// * `Err(anyhow::Error)` - If configuration is missing or the catalog is unreachable
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docfetch=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = RetrievalConfig::from_env_values(|key| std::env::var(key).ok())?;
    config.log_summary();

    let input = match std::env::args().nth(1) {
        Some(path) => read_input_file(Path::new(&path))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let items: Vec<BatchItem> = parse_identifiers(&input)
        .into_iter()
        .map(BatchItem::catalog)
        .collect();
    tracing::info!("++ Retrieving {} documents", items.len());

    let retriever = build_retriever(&config).await?;
    let report = batch_orchestrator(&config, retriever)
        .retrieve_all(items)
        .await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_input_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read identifiers from {}: {}", path.display(), e))
}

/// Identifiers in `input`, one per line, skipping blanks and `#` comments.
fn parse_identifiers(input: &str) -> Vec<DocumentId> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| DocumentId::new(line).ok())
        .collect()
}

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use askdocs::chunker::DEFAULT_MAX_FRAGMENT_LEN;
use askdocs::config::{ModelArgs, RetryArgs};
use askdocs::logging::init_logging;
use askdocs::{Indexer, VectorStore};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "askdocs-embedder",
    about = "Split .txt documents into fragments, embed them and write the vector store"
)]
struct EmbedCli {
    /// Directory containing the .txt documents to index
    #[arg(long, env = "ASKDOCS_INPUT_DIR", default_value = "Input")]
    input: PathBuf,

    /// Directory the embed_*.json records are written to
    #[arg(long, env = "ASKDOCS_STORE_DIR", default_value = "Embeddings")]
    store_dir: PathBuf,

    /// Max characters per fragment
    #[arg(long, env = "ASKDOCS_MAX_FRAGMENT_LEN", default_value_t = DEFAULT_MAX_FRAGMENT_LEN)]
    max_fragment_len: usize,

    /// Number of concurrent embedding workers
    #[arg(long, env = "ASKDOCS_EMBED_WORKERS", default_value_t = 1)]
    workers: usize,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    retry: RetryArgs,
}

fn main() -> Result<()> {
    init_logging();
    let cli = EmbedCli::parse();
    let embedder = cli.model.build_embedder()?;
    let indexer = Indexer::new(embedder, VectorStore::new(&cli.store_dir))
        .with_retry(cli.retry.policy())
        .with_max_fragment_len(cli.max_fragment_len)
        .with_workers(cli.workers);

    info!(
        input = %cli.input.display(),
        store = %cli.store_dir.display(),
        workers = cli.workers.max(1),
        "indexing documents"
    );
    let summary = indexer
        .index_directory(&cli.input)
        .with_context(|| format!("indexing {} aborted", cli.input.display()))?;

    for (name, fragments) in &summary.indexed {
        println!("{name}: {fragments} fragment(s)");
    }
    for (name, err) in &summary.failed {
        error!(document = %name, error = %err, "document failed");
    }
    println!(
        "indexed {} document(s), {} failed",
        summary.indexed.len(),
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        bail!("{} document(s) could not be indexed", summary.failed.len());
    }
    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use askdocs::logging::init_logging;
use askdocs::upgrade::consolidate;
use askdocs::VectorStore;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "askdocs-upgrade-store",
    about = "Consolidate legacy per-fragment embed_{source}_{n}.json files into per-document records"
)]
struct UpgradeCli {
    /// Directory holding the legacy fragment files
    #[arg(long, env = "ASKDOCS_STORE_DIR", default_value = "Embeddings")]
    legacy_dir: PathBuf,

    /// Directory consolidated records are written to
    #[arg(long, default_value = "Consolidated")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    init_logging();
    let cli = UpgradeCli::parse();
    let output = VectorStore::new(&cli.output_dir);
    let summary = consolidate(&cli.legacy_dir, &output)
        .with_context(|| format!("failed to upgrade {}", cli.legacy_dir.display()))?;
    for (source, fragments) in &summary.written {
        println!("{source}: {fragments} fragment(s)");
    }
    println!(
        "wrote {} record(s) to {}; move them into the store directory to use them",
        summary.written.len(),
        cli.output_dir.display()
    );
    Ok(())
}

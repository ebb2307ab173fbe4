//! Status command - show index status and statistics.

use crate::app::App;
use quarry_core::{Config, IndexState};
use std::path::PathBuf;

/// Run the status command.
pub fn run(config: Config, vault: Option<PathBuf>) -> anyhow::Result<()> {
    let app = App::new(config, vault)?;

    println!("Quarry Index Status");
    println!("===================");
    println!();
    println!("Vault:          {}", app.vault.display());
    println!("Data directory: {}", app.config.data_dir()?.display());

    if !app.store.exists() {
        println!();
        println!("No snapshot found. Run 'quarry index' to build the index.");
        return Ok(());
    }

    app.open()?;
    let stats = app.manager.stats();

    println!();
    println!("Summary:");
    println!("  Documents:   {}", stats.documents);
    println!("  Terms:       {}", stats.terms);
    println!("  State:       {}", stats.state);
    if let Some(size) = app.store.size_on_disk() {
        println!(
            "  Snapshot:    {} bytes ({:.2} MB)",
            size,
            size as f64 / (1024.0 * 1024.0)
        );
    }
    println!("  Fingerprint: {}", app.config.tokenizer_fingerprint());

    if let Some(updated) = stats.last_updated {
        println!(
            "  Loaded:      {}",
            updated.format("%Y-%m-%d %H:%M:%S")
        );
    }

    if stats.state != IndexState::Ready {
        println!();
        println!("⚠ Index is not ready");
    }

    Ok(())
}

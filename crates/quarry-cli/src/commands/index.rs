//! Index command - build the index or load it from the snapshot.

use crate::app::App;
use quarry_core::Config;
use std::path::PathBuf;
use std::time::Instant;

/// Run the index command.
pub fn run(
    config: Config,
    vault: Option<PathBuf>,
    force: bool,
    from_backup: bool,
) -> anyhow::Result<()> {
    let app = App::new(config, vault)?;

    if from_backup {
        match app.store.restore_from_backup()? {
            Some(_) => println!("Restored the backup snapshot."),
            None => {
                eprintln!("No backup snapshot found.");
                return Ok(());
            }
        }
    }

    let start = Instant::now();
    let documents = if force || !app.store.exists() {
        println!("Building index for {}...", app.vault.display());
        app.manager.force_reindex_all()?
    } else {
        app.open()?
    };
    let elapsed = start.elapsed();

    let stats = app.manager.stats();
    println!();
    println!("Index ready.");
    println!("  Documents: {}", documents);
    println!("  Terms:     {}", stats.terms);
    println!("  Time:      {:.2}s", elapsed.as_secs_f64());
    if let Some(size) = app.store.size_on_disk() {
        println!("  Snapshot:  {} bytes", size);
    }

    Ok(())
}

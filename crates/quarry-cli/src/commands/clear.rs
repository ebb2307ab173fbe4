//! Clear command - remove stored index data.

use quarry_core::{Config, FileSnapshotStore, SnapshotStore};
use std::io::{self, Write};

/// Run the clear command.
pub fn run(config: Config, skip_confirm: bool) -> anyhow::Result<()> {
    let store = FileSnapshotStore::new(config.data_dir()?);

    if !store.exists() {
        println!("No snapshot found. Nothing to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!(
            "This will delete {}. Are you sure? [y/N] ",
            store.snapshot_path().display()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.clear()?;
    println!("Index data cleared.");

    Ok(())
}

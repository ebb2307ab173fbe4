//! Query command - rank files matching a query.

use super::lines::render_line;
use crate::app::App;
use crate::OutputFormat;
use quarry_core::{CombineWith, Config, SearchItem};
use std::path::PathBuf;
use std::time::Instant;

/// Run the query command.
pub fn run(
    mut config: Config,
    vault: Option<PathBuf>,
    query: &str,
    limit: usize,
    or: bool,
    lines: usize,
    output: OutputFormat,
) -> anyhow::Result<()> {
    config.search.max_results = limit;
    let combine_with = if or {
        CombineWith::Or
    } else {
        config.search.combine_with
    };

    let app = App::new(config, vault)?;
    if app.open()? == 0 {
        eprintln!("Index is empty. Is the vault path right?");
        return Ok(());
    }

    let start = Instant::now();
    let items = app.manager.search_items_with(query, lines, combine_with)?;
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            let mut files = 0;
            for item in &items {
                match item {
                    SearchItem::File(file) => {
                        files += 1;
                        println!("{:>8.3}  {}", file.score, file.path);
                    }
                    SearchItem::Line { line, .. } => {
                        println!("  {}", render_line(&app.config, line));
                    }
                }
            }

            eprintln!();
            eprintln!(
                "Found {} files in {:.3}ms",
                files,
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}

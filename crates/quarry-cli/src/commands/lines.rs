//! Lines command - show the best matching lines of one file.

use crate::app::App;
use crate::OutputFormat;
use quarry_core::tokenizer::is_cjk;
use quarry_core::{
    Config, DocumentSource, Excerpt, Line, LinesMatcher, MatchedLine, TruncateType,
};
use std::path::PathBuf;

/// Run the lines command.
pub fn run(
    config: Config,
    vault: Option<PathBuf>,
    path: &str,
    query: &str,
    max_lines: usize,
    context: bool,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let app = App::new(config, vault)?;
    app.open()?;

    let lines = app.manager.get_line_matches(path, query, max_lines)?;
    if lines.is_empty() {
        eprintln!("No matching lines in {}.", path);
        return Ok(());
    }

    match output {
        OutputFormat::Text => {
            let paragraph = if context {
                let content = app.source.read_content(path)?;
                Some((LinesMatcher::from_config(&app.config), Line::split(&content)))
            } else {
                None
            };

            for line in &lines {
                match &paragraph {
                    Some((matcher, all_lines)) => {
                        let limit = app.config.truncate.limit(TruncateType::Paragraph, false);
                        for ctx in matcher.context(all_lines, line.row, limit) {
                            if ctx.row == line.row {
                                println!("{}", render_line(&app.config, line));
                            } else {
                                println!("{:>6}  {}", ctx.row + 1, ctx.text);
                            }
                        }
                        println!("    --");
                    }
                    None => println!("{}", render_line(&app.config, line)),
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&lines)?);
        }
    }

    Ok(())
}

/// Format a matched line as `row: excerpt`, with highlights in brackets.
pub fn render_line(config: &Config, line: &MatchedLine) -> String {
    let wide = line.text.chars().any(is_cjk);
    let limit = config.truncate.limit(TruncateType::Line, wide);
    format!("{:>6}: {}", line.row + 1, bracket(&line.excerpt(limit)))
}

fn bracket(excerpt: &Excerpt) -> String {
    let mut out = String::with_capacity(excerpt.text.len() + 8);
    let mut open = false;
    for (i, c) in excerpt.text.chars().enumerate() {
        let hit = excerpt.positions.contains(&i);
        if hit && !open {
            out.push('[');
            open = true;
        } else if !hit && open {
            out.push(']');
            open = false;
        }
        out.push(c);
    }
    if open {
        out.push(']');
    }
    out
}

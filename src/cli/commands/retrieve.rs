//! Retrieve command - show the snippets nearest to a query.

use anyhow::Context;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use super::{ExitCode, report_error};
use crate::config::Settings;
use crate::retrieve::{RetrievalHit, Retriever};
use crate::vector::open_collection;

/// Characters of snippet text shown per table row.
const PREVIEW_CHARS: usize = 160;

/// Run the retrieve command.
pub fn run(settings: &Settings, query: &str, k: Option<usize>, json: bool) -> ExitCode {
    match retrieve(settings, query, k) {
        Ok(hits) => {
            if json {
                match serde_json::to_string_pretty(&hits) {
                    Ok(out) => println!("{out}"),
                    Err(e) => return report_error(&anyhow::Error::from(e)),
                }
            } else if hits.is_empty() {
                eprintln!("No results found.");
            } else {
                println!("{}", hits_table(&hits));
            }
            ExitCode::Success
        }
        Err(e) => report_error(&e),
    }
}

fn retrieve(
    settings: &Settings,
    query: &str,
    k: Option<usize>,
) -> anyhow::Result<Vec<RetrievalHit>> {
    let collection = open_collection(settings).context("failed to open vector store")?;
    let retriever = Retriever::new(collection.as_ref(), settings.retrieval.top_k);
    Ok(retriever.retrieve(query, k)?)
}

fn hits_table(hits: &[RetrievalHit]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Source", "Distance", "Snippet"]);

    for (i, hit) in hits.iter().enumerate() {
        let distance = hit
            .distance
            .map(|d| format!("{d:.4}"))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            (i + 1).to_string(),
            hit.source().to_string(),
            distance,
            preview(&hit.text, PREVIEW_CHARS),
        ]);
    }

    table
}

/// Single-line preview of at most `max_chars` characters.
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('\u{2026}');
    cut
}

//! Ingest command - build the vector index from the SOP directory.

use anyhow::Context;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use indicatif::{ProgressBar, ProgressStyle};

use super::{ExitCode, report_error};
use crate::config::{Settings, StoreBackend};
use crate::documents::types::source_name;
use crate::documents::{DocumentLoader, FileOutcome, IngestProgress, IngestReport, Ingestor};
use crate::vector::open_collection;

/// Run the ingest command.
pub fn run(settings: &Settings, fail_on_error: bool, no_progress: bool) -> ExitCode {
    let raw_dir = &settings.paths.raw_docs;
    if !raw_dir.is_dir() {
        eprintln!(
            "No documents found in: {} (directory does not exist)",
            raw_dir.display()
        );
        return ExitCode::GeneralError;
    }

    let show_progress = !no_progress && is_terminal::is_terminal(std::io::stderr());
    match ingest(settings, show_progress) {
        Ok(report) => finish(settings, &report, fail_on_error),
        Err(e) => report_error(&e),
    }
}

fn ingest(settings: &Settings, show_progress: bool) -> anyhow::Result<IngestReport> {
    let raw_dir = &settings.paths.raw_docs;

    if settings.store.backend == StoreBackend::Local {
        std::fs::create_dir_all(&settings.paths.vectorstore).with_context(|| {
            format!(
                "failed to create vector store directory {}",
                settings.paths.vectorstore.display()
            )
        })?;
    }

    let collection = open_collection(settings).context("failed to open vector store")?;

    let loader = DocumentLoader::default().recursive(settings.paths.recursive);
    let ingestor = Ingestor::new(
        collection.as_ref(),
        settings.retrieval.chunking(),
        settings.retrieval.id_strategy,
    )
    .with_loader(loader);

    let mut bar: Option<ProgressBar> = None;
    let report = ingestor
        .run_with_progress(raw_dir, |event| match event {
            IngestProgress::Discovered { total } => {
                if show_progress && total > 0 {
                    bar = Some(progress_bar(total as u64));
                }
            }
            IngestProgress::ProcessingFile { path, .. } => {
                if let Some(bar) = &bar {
                    bar.set_message(source_name(path));
                }
            }
            IngestProgress::FileDone { path, outcome } => {
                let line = match outcome {
                    FileOutcome::Failed => Some(format!("Failed: {}", path.display())),
                    FileOutcome::SkippedEmpty => {
                        Some(format!("Empty file (skipped): {}", path.display()))
                    }
                    // The bar already counts indexed files
                    FileOutcome::Indexed { .. } if bar.is_some() => None,
                    FileOutcome::Indexed { chunks } => {
                        Some(format!("Indexed: {} ({chunks} chunks)", path.display()))
                    }
                };
                match (&bar, line) {
                    (Some(bar), Some(line)) => bar.println(line),
                    (None, Some(line)) => eprintln!("{line}"),
                    _ => {}
                }
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
        })
        .with_context(|| format!("failed to ingest {}", raw_dir.display()))?;

    if let Some(bar) = bar.take() {
        bar.finish_and_clear();
    }

    Ok(report)
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:28.cyan/blue}] {pos}/{len} files  {wide_msg}",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn finish(settings: &Settings, report: &IngestReport, fail_on_error: bool) -> ExitCode {
    if report.files_found == 0 {
        eprintln!("No documents found in: {}", settings.paths.raw_docs.display());
        return ExitCode::Success;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Files found", "Indexed", "Empty", "Failed", "Chunks"])
        .add_row(vec![
            report.files_found.to_string(),
            report.files_indexed.to_string(),
            report.files_skipped_empty.to_string(),
            report.files_failed.to_string(),
            report.chunks_written.to_string(),
        ]);
    eprintln!("{table}");

    for failure in &report.failures {
        eprintln!(
            "  {} ({:?}): {}",
            failure.path.display(),
            failure.stage,
            failure.error
        );
    }

    let location = match settings.store.backend {
        StoreBackend::Local => settings.paths.vectorstore.display().to_string(),
        StoreBackend::Chroma => format!(
            "{} (collection '{}')",
            settings.store.chroma_url, settings.store.collection
        ),
    };
    println!("\u{2705} Ingest complete. Vector store at: {location}");

    if fail_on_error && report.has_failures() {
        eprintln!("{} file(s) failed", report.files_failed);
        ExitCode::PartialFailure
    } else {
        ExitCode::Success
    }
}

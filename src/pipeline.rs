//! Pipeline runner.
//!
//! Orchestrates one full run over the source mirror:
//!
//! ```text
//! datasets ─┐
//!           ├─▶ discover ─▶ [parse → stages → serialize] × N ─▶ write ─▶ index flush
//! config  ──┘                  (spawn_blocking, ≤ workers)
//! ```
//!
//! # Failure isolation
//!
//! Before each stage the document is serialized; if the stage returns a
//! recoverable error the tree is rebuilt from that snapshot, so later stages
//! see the document exactly as if the failed stage had not run. A fatal
//! stage error, or a file that cannot be parsed at all, sends the original
//! bytes to the output unchanged and keeps the page out of the search index.
//!
//! # Concurrency
//!
//! Documents are independent. Each one is parsed, transformed and
//! serialized on a blocking worker (the DOM is not `Send`), bounded by a
//! semaphore of `pipeline.workers` permits. Datasets and the stage registry
//! are shared read-only; the search index is the only shared mutable state
//! and is ordered by discovery sequence on flush.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::datasets::Datasets;
use crate::discovery::{PageDiscovery, PagePath};
use crate::document::Document;
use crate::index::{entry_for, SearchIndexBuilder};
use crate::models::SearchIndexEntry;
use crate::progress::{ProgressMode, RunProgressEvent, RunProgressReporter};
use crate::report::{DocumentStatus, FailureKind, FailureRecord, RunReport};
use crate::stages::StageRegistry;
use crate::writer::OutputWriter;

/// Per-run switches that do not belong in the config file.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub dry_run: bool,
    pub progress: ProgressMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            progress: ProgressMode::Off,
        }
    }
}

/// Result of pushing one document through the stages.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub path: String,
    /// Bytes to write: the transformed document, or the original on failure.
    pub output: Vec<u8>,
    pub status: DocumentStatus,
    pub failures: Vec<FailureRecord>,
    /// `None` when the document failed and must stay out of the index.
    pub entry: Option<SearchIndexEntry>,
}

impl DocumentOutcome {
    fn copied_through(path: &str, raw: &[u8], failure: FailureRecord) -> Self {
        Self {
            path: path.to_string(),
            output: raw.to_vec(),
            status: DocumentStatus::Failed,
            failures: vec![failure],
            entry: None,
        }
    }
}

/// The run-scoped state: datasets, stages and index settings.
///
/// Built once at run start and dropped at run end; nothing here is
/// mutated while documents are processed.
pub struct Pipeline {
    registry: StageRegistry,
    datasets: Datasets,
    max_text_chars: usize,
}

impl Pipeline {
    pub fn new(config: &Config, datasets: Datasets) -> Self {
        Self {
            registry: StageRegistry::from_config(config),
            datasets,
            max_text_chars: config.search.max_text_chars,
        }
    }

    /// Load every dataset named in the config. Any failure is fatal.
    pub fn load(config: &Config) -> Result<Self> {
        let datasets = Datasets::load(config).context("Failed to load datasets")?;
        tracing::info!(
            threads = datasets.comments.thread_count(),
            comments = datasets.comments.comment_count(),
            dropped_comments = datasets.comments.dropped(),
            tracks = datasets.music.len(),
            articles = datasets.articles.len(),
            "datasets loaded"
        );
        Ok(Self::new(config, datasets))
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn datasets(&self) -> &Datasets {
        &self.datasets
    }

    /// Parse, apply every enabled stage, serialize.
    pub fn transform(&self, path: &str, raw: &[u8]) -> DocumentOutcome {
        let mut doc = match Document::parse(path, raw) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path, reason = %e, "copying malformed document through");
                let failure = FailureRecord::new(path, "parse", FailureKind::Malformed, &e);
                return DocumentOutcome::copied_through(path, raw, failure);
            }
        };

        let mut failures = Vec::new();
        for stage in self.registry.stages() {
            let snapshot = match doc.serialize() {
                Ok(s) => s,
                Err(e) => {
                    let failure = FailureRecord::new(path, stage.name(), FailureKind::Malformed, &e);
                    return DocumentOutcome::copied_through(path, raw, failure);
                }
            };
            match stage.apply(&mut doc, &self.datasets) {
                Ok(()) => {
                    tracing::debug!(path, stage = stage.name(), "stage applied");
                }
                Err(e) if e.is_fatal() => {
                    tracing::warn!(path, stage = stage.name(), reason = %e, "stage failed fatally, copying document through");
                    let failure = FailureRecord::new(path, stage.name(), FailureKind::Fatal, &e);
                    return DocumentOutcome::copied_through(path, raw, failure);
                }
                Err(e) => {
                    tracing::warn!(path, stage = stage.name(), reason = %e, "stage skipped");
                    doc.restore(&snapshot);
                    failures.push(FailureRecord::new(path, stage.name(), FailureKind::Stage, &e));
                }
            }
        }

        let output = match doc.serialize() {
            Ok(s) => s.into_bytes(),
            Err(e) => {
                let failure = FailureRecord::new(path, "serialize", FailureKind::Malformed, &e);
                return DocumentOutcome::copied_through(path, raw, failure);
            }
        };

        DocumentOutcome {
            path: path.to_string(),
            output,
            status: if failures.is_empty() {
                DocumentStatus::Succeeded
            } else {
                DocumentStatus::PartiallyFailed
            },
            failures,
            entry: Some(entry_for(&doc, &self.datasets, self.max_text_chars)),
        }
    }
}

/// Outcome of one page after it has been written.
struct PageResult {
    seq: usize,
    status: DocumentStatus,
    failures: Vec<FailureRecord>,
}

/// Read, transform and write one page. Runs on a blocking worker.
fn process_page(
    seq: usize,
    page: &PagePath,
    pipeline: &Pipeline,
    writer: &OutputWriter,
    index: &SearchIndexBuilder,
) -> PageResult {
    let raw = match std::fs::read(&page.absolute) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %page.relative, reason = %e, "failed to read page");
            return PageResult {
                seq,
                status: DocumentStatus::Failed,
                failures: vec![FailureRecord::new(&page.relative, "read", FailureKind::Io, e)],
            };
        }
    };

    let outcome = pipeline.transform(&page.relative, &raw);
    let DocumentOutcome {
        output,
        mut status,
        mut failures,
        entry,
        ..
    } = outcome;

    match writer.write(&page.relative, &output) {
        Ok(()) => {
            if let Some(entry) = entry {
                index.accept(seq, entry);
            }
        }
        Err(e) => {
            tracing::warn!(path = %page.relative, reason = %e, "failed to write page");
            status = DocumentStatus::Failed;
            failures.push(FailureRecord::new(&page.relative, "write", FailureKind::Io, e));
        }
    }

    PageResult {
        seq,
        status,
        failures,
    }
}

/// Run the whole pipeline over the mirror described by `config`.
///
/// Returns `Err` only for run-level fatal conditions: source root missing,
/// output root unwritable, search index not writable. Everything else is in
/// the returned report.
pub async fn run_pipeline(
    config: &Config,
    pipeline: Arc<Pipeline>,
    opts: RunOptions,
) -> Result<RunReport> {
    let reporter: Arc<dyn RunProgressReporter> = Arc::from(opts.progress.reporter());
    reporter.report(RunProgressEvent::Discovering);

    let discovery = PageDiscovery::from_config(config)?;
    let writer = Arc::new(OutputWriter::new(&config.paths.output_root, opts.dry_run)?);
    let index = Arc::new(SearchIndexBuilder::new());

    let mut pages = Vec::new();
    for page in discovery.iter() {
        match page {
            Ok(page) => pages.push(page),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable mirror entry"),
        }
    }
    let total = pages.len() as u64;
    tracing::info!(
        pages = total,
        stages = ?pipeline.registry().names(),
        workers = config.pipeline.workers,
        dry_run = opts.dry_run,
        "starting run"
    );

    let semaphore = Arc::new(Semaphore::new(config.pipeline.workers));
    let done = Arc::new(AtomicU64::new(0));
    let mut tasks: JoinSet<PageResult> = JoinSet::new();
    let mut spawned: Vec<String> = Vec::new();
    let mut interrupted = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    for (seq, page) in pages.into_iter().enumerate() {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit.context("worker pool closed")?,
            _ = &mut ctrl_c => {
                tracing::warn!("interrupted, finishing in-flight pages");
                interrupted = true;
                break;
            }
        };

        spawned.push(page.relative.clone());
        let pipeline = pipeline.clone();
        let writer = writer.clone();
        let index = index.clone();
        let reporter = reporter.clone();
        let done = done.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = process_page(seq, &page, &pipeline, &writer, &index);
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.report(RunProgressEvent::Processing { n, total });
            result
        });
    }

    let mut results: Vec<Option<PageResult>> = spawned.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                if let Some(slot) = results.get_mut(result.seq) {
                    *slot = Some(result);
                }
            }
            Err(e) => tracing::error!(error = %e, "page worker panicked"),
        }
    }

    let mut report = RunReport::new();
    report.interrupted = interrupted;
    for (relative, result) in spawned.iter().zip(results) {
        match result {
            Some(result) => report.record(result.status, result.failures),
            // The worker died before returning; nothing was indexed for it.
            None => report.record(
                DocumentStatus::Failed,
                vec![FailureRecord::new(
                    relative.as_str(),
                    "worker",
                    FailureKind::Fatal,
                    "page worker panicked",
                )],
            ),
        }
    }

    if !interrupted {
        copy_assets(config, &discovery, &writer, &mut report);
    }

    let index_path = config.search.index_path.to_string_lossy().replace('\\', "/");
    let index = Arc::try_unwrap(index)
        .map_err(|_| anyhow::anyhow!("search index still shared after all workers finished"))?;
    report.index_entries = index
        .flush(&writer, &index_path)
        .with_context(|| format!("Failed to write search index {}", index_path))?;
    report.output_digest = writer.digest();

    reporter.report(RunProgressEvent::Finished {
        total: report.total as u64,
        failed: report.failed as u64,
    });
    tracing::info!(
        total = report.total,
        succeeded = report.succeeded,
        partially_failed = report.partially_failed,
        failed = report.failed,
        interrupted = report.interrupted,
        "run finished"
    );
    Ok(report)
}

/// Copy non-page files, the theme stylesheet, then patch CSS.
fn copy_assets(
    config: &Config,
    discovery: &PageDiscovery,
    writer: &OutputWriter,
    report: &mut RunReport,
) {
    if config.pipeline.copy_assets {
        for (path, e) in writer.copy_assets(discovery) {
            tracing::warn!(path = %path, reason = %e, "failed to copy asset");
            report.record_failure(FailureRecord::new(path, "copy", FailureKind::Io, e));
        }
    }

    if let Some(source) = &config.theme.stylesheet_source {
        let relative = config.theme.stylesheet.trim_start_matches('/');
        if let Err(e) = writer.copy(source, relative) {
            tracing::warn!(path = relative, reason = %e, "failed to copy theme stylesheet");
            report.record_failure(FailureRecord::new(relative, "copy", FailureKind::Io, e));
        }
    }

    for (path, e) in writer.apply_css_patches(&config.assets.css_patches) {
        tracing::warn!(path = %path, reason = %e, "failed to patch stylesheet");
        report.record_failure(FailureRecord::new(path, "css_patch", FailureKind::Io, e));
    }
}

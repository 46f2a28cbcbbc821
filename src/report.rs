//! End-of-run report.
//!
//! Per-document problems never abort a run; they are collected here and
//! printed as a summary (and optionally written as JSON with `--report`)
//! with enough detail to re-run diagnostics on specific files.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::progress::format_number;

/// How a single document came out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Every enabled stage applied.
    Succeeded,
    /// At least one stage was skipped after a recoverable error.
    PartiallyFailed,
    /// The document was copied through unmodified, or could not be written.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A stage was skipped; the document still went through the others.
    Stage,
    /// A stage left the tree unusable.
    Fatal,
    /// The file could not be parsed at all.
    Malformed,
    /// Reading or writing the file failed.
    Io,
}

/// One recorded failure: which file, which stage, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: String,
    pub stage: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(
        path: impl Into<String>,
        stage: impl Into<String>,
        kind: FailureKind,
        reason: impl ToString,
    ) -> Self {
        Self {
            path: path.into(),
            stage: stage.into(),
            kind,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: usize,
    pub partially_failed: usize,
    pub failed: usize,
    /// In discovery order; asset failures follow document failures.
    pub failures: Vec<FailureRecord>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub index_entries: usize,
    /// SHA-256 over the whole output tree.
    #[serde(default)]
    pub output_digest: String,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one document and keep its failures.
    pub fn record(&mut self, status: DocumentStatus, failures: Vec<FailureRecord>) {
        self.total += 1;
        match status {
            DocumentStatus::Succeeded => self.succeeded += 1,
            DocumentStatus::PartiallyFailed => self.partially_failed += 1,
            DocumentStatus::Failed => self.failed += 1,
        }
        self.failures.extend(failures);
    }

    /// Keep a failure that is not tied to a processed document (asset copy).
    pub fn record_failure(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }

    /// Whether every document went through every stage.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Print the human summary to stdout.
    pub fn print_summary(&self) {
        println!("Mirror Restore — Run Summary");
        println!("============================");
        println!();
        println!("  Documents:        {}", format_number(self.total as u64));
        println!("  Succeeded:        {}", format_number(self.succeeded as u64));
        println!(
            "  Partially failed: {}",
            format_number(self.partially_failed as u64)
        );
        println!("  Failed:           {}", format_number(self.failed as u64));
        println!("  Indexed:          {}", format_number(self.index_entries as u64));
        if !self.output_digest.is_empty() {
            println!("  Output digest:    {}", self.output_digest);
        }
        if self.interrupted {
            println!();
            println!("  Run was interrupted; remaining pages were not processed.");
        }

        if !self.failures.is_empty() {
            println!();
            println!("  Failures:");
            println!("  {:<40} {:<12} {:<10} {}", "PATH", "STAGE", "KIND", "REASON");
            println!("  {}", "-".repeat(76));
            for f in &self.failures {
                println!(
                    "  {:<40} {:<12} {:<10} {}",
                    f.path,
                    f.stage,
                    kind_label(f.kind),
                    f.reason
                );
            }
        }

        println!();
    }
}

fn kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Stage => "stage",
        FailureKind::Fatal => "fatal",
        FailureKind::Malformed => "malformed",
        FailureKind::Io => "io",
    }
}

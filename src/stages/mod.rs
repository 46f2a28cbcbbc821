//! Document transformation stages.
//!
//! A stage is one deterministic, idempotent rewrite of a single document:
//! applying it to its own output changes nothing. Stages are registered in a
//! fixed order because later ones rely on markup produced by earlier ones
//! (the UI fixes run over containers the comment restorer filled, and the
//! ad stripper runs after restored comments are in place).
//!
//! ```text
//! dark_theme → comments → music → age → ads → ui
//! ```
//!
//! # Adding a stage
//!
//! Implement [`Stage`], add its name to [`STAGE_NAMES`] at the position it
//! must run, and construct it in [`StageRegistry::from_config`].

pub mod ads;
pub mod age;
pub mod comments;
pub mod music;
pub mod theme;
pub mod ui;

use crate::config::Config;
use crate::datasets::Datasets;
use crate::document::Document;
use crate::error::StageError;

/// Canonical stage names, in execution order.
pub const STAGE_NAMES: [&str; 6] = ["dark_theme", "comments", "music", "age", "ads", "ui"];

/// One transformation applied to every document.
///
/// Implementations must be:
///
/// - **Deterministic**: output depends only on the document and datasets.
/// - **Idempotent**: a second application is a no-op.
/// - **Conservative**: a missing dataset entry leaves the page untouched.
///
/// A stage may leave the document half-modified when it returns an error;
/// the runner restores the pre-stage state before moving on.
pub trait Stage: Send + Sync {
    /// Stable name used in configuration and failure reports.
    fn name(&self) -> &'static str;

    /// One-line description for `mirror stages`.
    fn description(&self) -> &'static str;

    fn apply(&self, doc: &mut Document, data: &Datasets) -> Result<(), StageError>;
}

/// Ordered list of stages applied to each document.
pub struct StageRegistry {
    stages: Vec<Box<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// All built-in stages that are enabled in the config, in canonical order.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for stage in builtin_stages(config) {
            if config.stage_enabled(stage.name()) {
                registry.register(stage);
            }
        }
        registry
    }

    /// Append a stage; it runs after every stage registered before it.
    pub fn register(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&dyn Stage> {
        self.stages
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Every built-in stage, in canonical order, regardless of enablement.
pub fn builtin_stages(config: &Config) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(theme::DarkThemeInjector::new(&config.theme)),
        Box::new(comments::CommentRestorer::new(&config.comments)),
        Box::new(music::MusicLinkResolver::new(&config.music)),
        Box::new(age::AgeAnnotator::new(&config.annotate)),
        Box::new(ads::AdStripper::new(&config.ads)),
        Box::new(ui::UiFixer::new(&config.ui)),
    ]
}

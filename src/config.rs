use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::stages::STAGE_NAMES;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub comments: CommentsConfig,
    #[serde(default)]
    pub music: MusicConfig,
    #[serde(default)]
    pub annotate: AnnotateConfig,
    #[serde(default)]
    pub ads: AdsConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetsConfig {
    pub comments: PathBuf,
    pub music: PathBuf,
    pub articles: PathBuf,
    #[serde(default)]
    pub comments_css: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_true")]
    pub copy_assets: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            workers: default_workers(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            copy_assets: true,
        }
    }
}

fn default_stages() -> Vec<String> {
    STAGE_NAMES.iter().map(|s| s.to_string()).collect()
}
fn default_workers() -> usize {
    6
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.html".to_string(), "**/*.htm".to_string()]
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("search-index.json")
}
fn default_max_text_chars() -> usize {
    20_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThemeConfig {
    #[serde(default = "default_stylesheet")]
    pub stylesheet: String,
    #[serde(default)]
    pub stylesheet_source: Option<PathBuf>,
    #[serde(default = "default_toggle_label")]
    pub toggle_label: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            stylesheet: default_stylesheet(),
            stylesheet_source: None,
            toggle_label: default_toggle_label(),
        }
    }
}

fn default_stylesheet() -> String {
    "assets/mirror-dark.css".to_string()
}
fn default_toggle_label() -> String {
    "Dark theme".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommentsConfig {
    #[serde(default = "default_comment_container")]
    pub container: String,
    #[serde(default = "default_empty_placeholder")]
    pub empty_placeholder: String,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            container: default_comment_container(),
            empty_placeholder: default_empty_placeholder(),
        }
    }
}

fn default_comment_container() -> String {
    ".kmt-list".to_string()
}
fn default_empty_placeholder() -> String {
    ".kmt-empty-comment".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MusicConfig {
    #[serde(default = "default_embed_selector")]
    pub embed_selector: String,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            embed_selector: default_embed_selector(),
        }
    }
}

fn default_embed_selector() -> String {
    "iframe[src], embed[src], audio[src], source[src], object[data], [data-track]".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnnotateConfig {
    #[serde(default = "default_byline")]
    pub byline: String,
    /// Label template; `{age}` is replaced with the approximate age.
    #[serde(default = "default_age_label")]
    pub label: String,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            byline: default_byline(),
            label: default_age_label(),
        }
    }
}

fn default_byline() -> String {
    r#".createdby, [itemprop="author"], .author"#.to_string()
}
fn default_age_label() -> String {
    "approx. {age} y.o.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdsConfig {
    #[serde(default = "default_fingerprints")]
    pub fingerprints: Vec<Fingerprint>,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            fingerprints: default_fingerprints(),
        }
    }
}

/// A structural shape of unwanted markup.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub selector: String,
    /// Only match elements whose text contains this string.
    #[serde(default)]
    pub contains: Option<String>,
}

impl Fingerprint {
    pub fn selector(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            contains: None,
        }
    }
}

fn default_fingerprints() -> Vec<Fingerprint> {
    vec![
        Fingerprint::selector(".commentForm"),
        Fingerprint::selector(".kmt-addyours"),
        Fingerprint::selector("#system-message-container"),
        Fingerprint::selector(r#".copyright [style="display:none"]"#),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    #[serde(default = "default_slogan_selector")]
    pub slogan_selector: String,
    #[serde(default)]
    pub slogan: Option<String>,
    #[serde(default = "default_homepage")]
    pub homepage: String,
    #[serde(default = "default_homepage_container")]
    pub homepage_container: String,
    #[serde(default)]
    pub homepage_html: Option<String>,
    #[serde(default = "default_footer_selector")]
    pub footer_selector: String,
    #[serde(default)]
    pub archive_note: Option<String>,
    #[serde(default = "default_author_list_selector")]
    pub author_list_selector: String,
    /// Mirror-root-relative path of a work page; `{id}` is the work id.
    #[serde(default = "default_work_path_template")]
    pub work_path_template: String,
    #[serde(default = "default_true")]
    pub clickable_images: bool,
    #[serde(default)]
    pub image_fixes: Vec<ImageFix>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            slogan_selector: default_slogan_selector(),
            slogan: None,
            homepage: default_homepage(),
            homepage_container: default_homepage_container(),
            homepage_html: None,
            footer_selector: default_footer_selector(),
            archive_note: None,
            author_list_selector: default_author_list_selector(),
            work_path_template: default_work_path_template(),
            clickable_images: true,
            image_fixes: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageFix {
    pub selector: String,
    pub src: String,
}

fn default_slogan_selector() -> String {
    ".site-slogan".to_string()
}
fn default_homepage() -> String {
    "index.htm".to_string()
}
fn default_homepage_container() -> String {
    ".t3-content".to_string()
}
fn default_footer_selector() -> String {
    ".copyright .custom".to_string()
}
fn default_author_list_selector() -> String {
    ".author-works[data-author]".to_string()
}
fn default_work_path_template() -> String {
    "works/{id}.html".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AssetsConfig {
    #[serde(default)]
    pub css_patches: Vec<CssPatch>,
}

/// Literal find/replace applied to one copied stylesheet.
#[derive(Debug, Deserialize, Clone)]
pub struct CssPatch {
    pub path: PathBuf,
    pub find: String,
    pub replace: String,
}

impl Config {
    /// Whether `stage` is listed in `pipeline.stages`.
    pub fn stage_enabled(&self, stage: &str) -> bool {
        self.pipeline.stages.iter().any(|s| s == stage)
    }

    /// Replace the enabled stage list, validating names.
    pub fn override_stages(&mut self, stages: Vec<String>) -> Result<()> {
        validate_stage_names(&stages)?;
        self.pipeline.stages = stages;
        Ok(())
    }
}

fn validate_stage_names(stages: &[String]) -> Result<()> {
    for name in stages {
        if !STAGE_NAMES.contains(&name.as_str()) {
            anyhow::bail!(
                "Unknown stage: '{}'. Available: {}",
                name,
                STAGE_NAMES.join(", ")
            );
        }
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.paths.source_root == config.paths.output_root {
        anyhow::bail!("paths.source_root and paths.output_root must differ");
    }
    if config
        .paths
        .output_root
        .starts_with(&config.paths.source_root)
    {
        anyhow::bail!("paths.output_root must not be inside paths.source_root");
    }

    if config.pipeline.workers == 0 {
        anyhow::bail!("pipeline.workers must be >= 1");
    }
    if config.pipeline.include_globs.is_empty() {
        anyhow::bail!("pipeline.include_globs must not be empty");
    }
    validate_stage_names(&config.pipeline.stages)?;

    if config.search.index_path.is_absolute() {
        anyhow::bail!("search.index_path must be relative to paths.output_root");
    }
    if !config.annotate.label.contains("{age}") {
        anyhow::bail!("annotate.label must contain the {{age}} placeholder");
    }
    if !config.ui.work_path_template.contains("{id}") {
        anyhow::bail!("ui.work_path_template must contain the {{id}} placeholder");
    }
    for patch in &config.assets.css_patches {
        if patch.find.is_empty() {
            anyhow::bail!(
                "assets.css_patches entry for {} has an empty `find`",
                patch.path.display()
            );
        }
    }

    Ok(())
}

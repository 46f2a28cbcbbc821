//! External datasets: archived comments, music catalogue, article metadata.
//!
//! Each dataset is loaded once at the start of a run into an immutable
//! index and shared read-only (behind an `Arc`) by every worker. Lookups are
//! total: a missing key is `None`, never an error.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::DataSourceError;
use crate::models::{Article, Comment, CommentRecord, RecordId, Track, TrackRecord};

/// All datasets of one run.
#[derive(Debug, Default)]
pub struct Datasets {
    pub comments: CommentsArchive,
    pub music: MusicCatalogue,
    pub articles: ArticleMetadata,
    /// Stylesheet injected alongside restored comments.
    pub comments_css: Option<String>,
}

impl Datasets {
    pub fn load(config: &Config) -> Result<Self, DataSourceError> {
        let ds = &config.datasets;
        let comments_css = match &ds.comments_css {
            Some(path) => {
                let bytes = read_dataset("comments_css", path)?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            None => None,
        };
        Ok(Self {
            comments: CommentsArchive::load(&ds.comments)?,
            music: MusicCatalogue::load(&ds.music)?,
            articles: ArticleMetadata::load(&ds.articles)?,
            comments_css,
        })
    }

    pub fn find_comments(&self, page_id: &str) -> Option<&[Comment]> {
        self.comments.find(page_id)
    }

    pub fn find_track(&self, signature: &str) -> Option<&Track> {
        self.music.find(signature)
    }

    pub fn find_metadata(&self, work_id: &str) -> Option<&Article> {
        self.articles.find(work_id)
    }
}

/// Read a dataset file, base64-decoding it when the name ends in `.base64`.
fn read_dataset(dataset: &'static str, path: &Path) -> Result<Vec<u8>, DataSourceError> {
    if !path.exists() {
        return Err(DataSourceError::Missing {
            dataset,
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path).map_err(|source| DataSourceError::Read {
        dataset,
        path: path.to_path_buf(),
        source,
    })?;

    let is_base64 = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("base64"))
        .unwrap_or(false);
    if !is_base64 {
        return Ok(bytes);
    }

    // Exports are wrapped at 76 columns.
    let compact: Vec<u8> = bytes
        .into_iter()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|source| DataSourceError::Decode {
            dataset,
            path: path.to_path_buf(),
            source,
        })
}

fn parse_dataset<T: DeserializeOwned>(
    dataset: &'static str,
    path: &Path,
) -> Result<T, DataSourceError> {
    let bytes = read_dataset(dataset, path)?;
    serde_json::from_slice(&bytes).map_err(|source| DataSourceError::Parse {
        dataset,
        path: path.to_path_buf(),
        source,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Comments
// ═══════════════════════════════════════════════════════════════════════

/// Comment threads keyed by page identifier, each sorted by timestamp.
#[derive(Debug, Default)]
pub struct CommentsArchive {
    threads: HashMap<String, Vec<Comment>>,
    dropped: usize,
}

impl CommentsArchive {
    pub fn load(path: &Path) -> Result<Self, DataSourceError> {
        let records: Vec<CommentRecord> = parse_dataset("comments", path)?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<CommentRecord>) -> Self {
        let mut threads: HashMap<String, Vec<Comment>> = HashMap::new();
        let mut dropped = 0usize;

        for (index, record) in records.into_iter().enumerate() {
            let thread = record
                .thread
                .map(RecordId::into_string)
                .filter(|t| !t.is_empty())
                .or_else(|| record.url.as_deref().and_then(url_stem));
            let (Some(thread), Some(timestamp)) = (thread, record.timestamp.to_seconds()) else {
                tracing::warn!(index, "dropping comment record without thread key or timestamp");
                dropped += 1;
                continue;
            };

            let id = record
                .id
                .map(RecordId::into_string)
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{}-{}", thread, index));
            threads.entry(thread.clone()).or_default().push(Comment {
                id,
                thread,
                author: record.author,
                avatar: record.avatar.filter(|a| !a.is_empty()),
                title: record.title.filter(|t| !t.is_empty()),
                timestamp,
                body: record.body,
                parent: record
                    .parent
                    .map(RecordId::into_string)
                    .filter(|p| !p.is_empty()),
                parent_text: record.parent_text.filter(|p| !p.trim().is_empty()),
            });
        }

        // Stable sort: equal timestamps keep their archive order.
        for comments in threads.values_mut() {
            comments.sort_by_key(|c| c.timestamp);
        }

        Self { threads, dropped }
    }

    pub fn find(&self, page_id: &str) -> Option<&[Comment]> {
        self.threads
            .get(page_id)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn comment_count(&self) -> usize {
        self.threads.values().map(|v| v.len()).sum()
    }

    /// Records skipped at load time.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Stem of the last non-empty path segment of a URL, ignoring query and
/// fragment. Used both as the thread key of a comment URL and as the
/// signature of an embedded player. Relative URLs are read against the
/// mirror root.
///
/// `https://site/works/7.html?x=1#hcm=123` → `7`.
pub fn url_stem(url: &str) -> Option<String> {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => mirror_root()?.join(url.trim()).ok()?,
        Err(_) => return None,
    };
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    // Mirrored file names are stored decoded.
    let segment = urlencoding::decode(segment).ok()?;
    let stem = strip_extension(&segment);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Base URL that mirror-relative paths are resolved against.
pub(crate) fn mirror_root() -> Option<Url> {
    Url::parse("file:///").ok()
}

/// Drop a trailing `.ext` from a path segment.
pub(crate) fn strip_extension(segment: &str) -> &str {
    match segment.rfind('.') {
        Some(pos) if pos > 0 => &segment[..pos],
        _ => segment,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Music
// ═══════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogueFile {
    Map(BTreeMap<String, Track>),
    List(Vec<TrackRecord>),
}

/// Resolved tracks keyed by player signature or work id.
#[derive(Debug, Default)]
pub struct MusicCatalogue {
    tracks: HashMap<String, Track>,
}

impl MusicCatalogue {
    pub fn load(path: &Path) -> Result<Self, DataSourceError> {
        let file: CatalogueFile = parse_dataset("music", path)?;
        let tracks = match file {
            CatalogueFile::Map(map) => map.into_iter().collect(),
            CatalogueFile::List(list) => list
                .into_iter()
                .map(|record| (record.signature, record.track))
                .collect(),
        };
        Ok(Self { tracks })
    }

    pub fn from_tracks(tracks: impl IntoIterator<Item = (String, Track)>) -> Self {
        Self {
            tracks: tracks.into_iter().collect(),
        }
    }

    pub fn find(&self, signature: &str) -> Option<&Track> {
        self.tracks.get(signature)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Articles
// ═══════════════════════════════════════════════════════════════════════

/// Work metadata keyed by work id, plus an author → works grouping.
#[derive(Debug, Default)]
pub struct ArticleMetadata {
    by_id: HashMap<String, Article>,
    /// Work ids per author, sorted for stable output.
    by_author: BTreeMap<String, Vec<String>>,
}

impl ArticleMetadata {
    pub fn load(path: &Path) -> Result<Self, DataSourceError> {
        let articles: Vec<Article> = parse_dataset("articles", path)?;
        Ok(Self::from_articles(articles))
    }

    pub fn from_articles(articles: Vec<Article>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_author: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for article in articles {
            if let Some(author) = &article.author {
                by_author
                    .entry(author.clone())
                    .or_default()
                    .push(article.id.clone());
            }
            // Later duplicates win, matching a re-export that appends fixes.
            by_id.insert(article.id.clone(), article);
        }
        for ids in by_author.values_mut() {
            ids.sort_by(|a, b| natural_cmp(a, b));
            ids.dedup();
        }
        Self { by_id, by_author }
    }

    pub fn find(&self, work_id: &str) -> Option<&Article> {
        self.by_id.get(work_id)
    }

    /// Works of `author`, ordered by id (numeric ids compare numerically).
    pub fn works_by_author(&self, author: &str) -> &[String] {
        self.by_author
            .get(author)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn author_count(&self) -> usize {
        self.by_author.len()
    }
}

fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

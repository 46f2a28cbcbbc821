//! Client-side search index.
//!
//! Workers call [`SearchIndexBuilder::accept`] concurrently, tagging each
//! entry with the document's discovery sequence number; [`flush`] restores
//! discovery order before writing, so the exported file does not depend on
//! which worker finished first.
//!
//! Output shape:
//!
//! ```json
//! { "version": 1, "entries": [ { "id", "path", "title", "text", "tags", "author" } ] }
//! ```
//!
//! [`flush`]: SearchIndexBuilder::flush

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::datasets::Datasets;
use crate::document::Document;
use crate::error::OutputError;
use crate::models::SearchIndexEntry;
use crate::writer::OutputWriter;

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchIndexFile {
    pub version: u32,
    pub entries: Vec<SearchIndexEntry>,
}

/// Append-only collection point for index entries.
#[derive(Default)]
pub struct SearchIndexBuilder {
    entries: Mutex<Vec<(usize, SearchIndexEntry)>>,
}

impl SearchIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the entry of the document with discovery number `seq`.
    pub fn accept(&self, seq: usize, entry: SearchIndexEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push((seq, entry));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in discovery order.
    pub fn finish(self) -> SearchIndexFile {
        let mut entries = self.entries.into_inner().unwrap_or_else(|e| e.into_inner());
        entries.sort_by_key(|(seq, _)| *seq);
        SearchIndexFile {
            version: INDEX_VERSION,
            entries: entries.into_iter().map(|(_, entry)| entry).collect(),
        }
    }

    /// Write the index as pretty JSON through `writer`. Consumes the
    /// builder, so an index is flushed at most once.
    pub fn flush(self, writer: &OutputWriter, relative: &str) -> Result<usize, OutputError> {
        let file = self.finish();
        let count = file.entries.len();
        writer.write(relative, to_json(&file).as_bytes())?;
        tracing::info!(entries = count, path = relative, "wrote search index");
        Ok(count)
    }
}

fn to_json(file: &SearchIndexFile) -> String {
    // Plain strings and vectors only; serialization cannot fail.
    let mut json = serde_json::to_string_pretty(file).unwrap_or_default();
    json.push('\n');
    json
}

/// Build the index entry for a transformed document.
///
/// Title and tags come from article metadata when the page is a known
/// work, falling back to the page's own `<title>`.
pub fn entry_for(doc: &Document, data: &Datasets, max_text_chars: usize) -> SearchIndexEntry {
    let meta = data.find_metadata(doc.page_id());
    let title = meta
        .and_then(|m| m.title.clone())
        .filter(|t| !t.trim().is_empty())
        .or_else(|| doc.title());

    SearchIndexEntry {
        id: doc.page_id().to_string(),
        path: doc.path().to_string(),
        title,
        text: truncate_chars(doc.text(), max_text_chars),
        tags: meta.map(|m| m.tags.clone()).unwrap_or_default(),
        author: meta.and_then(|m| m.author.clone()),
    }
}

/// Cut `text` to at most `max` characters; `0` means unlimited.
fn truncate_chars(mut text: String, max: usize) -> String {
    if max == 0 {
        return text;
    }
    if let Some((cut, _)) = text.char_indices().nth(max) {
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::ArticleMetadata;
    use crate::models::Article;
    use tempfile::TempDir;

    fn entry(id: &str) -> SearchIndexEntry {
        SearchIndexEntry {
            id: id.to_string(),
            path: format!("works/{}.html", id),
            title: None,
            text: String::new(),
            tags: vec![],
            author: None,
        }
    }

    #[test]
    fn flush_restores_discovery_order() {
        let tmp = TempDir::new().unwrap();
        let writer = OutputWriter::new(tmp.path(), false).unwrap();

        let builder = SearchIndexBuilder::new();
        builder.accept(2, entry("c"));
        builder.accept(0, entry("a"));
        builder.accept(1, entry("b"));
        assert_eq!(builder.len(), 3);
        assert_eq!(builder.flush(&writer, "nested/search-index.json").unwrap(), 3);

        let path = tmp.path().join("nested/search-index.json");
        let file: SearchIndexFile =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(file.version, 1);
        let ids: Vec<&str> = file.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("привет мир".to_string(), 6), "привет");
        assert_eq!(truncate_chars("short".to_string(), 100), "short");
        assert_eq!(truncate_chars("unlimited".to_string(), 0), "unlimited");
    }

    #[test]
    fn entry_prefers_metadata() {
        let articles: Vec<Article> = serde_json::from_str(
            r#"[{"id":"7","title":"Seven","tags":["poem"],"author":"Ann"}]"#,
        )
        .unwrap();
        let data = Datasets {
            articles: ArticleMetadata::from_articles(articles),
            ..Default::default()
        };

        let doc = Document::parse_str(
            "works/7.html",
            "<title>Site | 7</title><body><p>Words  here</p></body>",
        )
        .unwrap();
        let e = entry_for(&doc, &data, 0);
        assert_eq!(e.id, "7");
        assert_eq!(e.path, "works/7.html");
        assert_eq!(e.title.as_deref(), Some("Seven"));
        assert_eq!(e.text, "Words here");
        assert_eq!(e.tags, vec!["poem"]);
        assert_eq!(e.author.as_deref(), Some("Ann"));

        let other = Document::parse_str("about.html", "<title>About</title><p>x</p>").unwrap();
        let e = entry_for(&other, &data, 0);
        assert_eq!(e.title.as_deref(), Some("About"));
        assert!(e.tags.is_empty());
    }
}

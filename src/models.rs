//! Core data models shared by the datasets, the stages and the search index.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archived comment, normalized from the export.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub thread: String,
    pub author: String,
    pub avatar: Option<String>,
    pub title: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Comment body as exported (HTML).
    pub body: String,
    pub parent: Option<String>,
    pub parent_text: Option<String>,
}

impl Comment {
    /// Human-readable date, `YYYY-MM-DD HH:MM`.
    pub fn display_date(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| self.timestamp.to_string())
    }
}

/// Raw comment record as found in the export file.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRecord {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub thread: Option<RecordId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(alias = "name")]
    pub author: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(alias = "t", alias = "date")]
    pub timestamp: Timestamp,
    #[serde(alias = "text")]
    pub body: String,
    #[serde(default, alias = "parent_id")]
    pub parent: Option<RecordId>,
    #[serde(default)]
    pub parent_text: Option<String>,
}

/// Identifier in an export: some exporters write ids as JSON numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Text(String),
    Number(i64),
}

impl RecordId {
    /// Canonical string form; numbers and their string spelling agree.
    pub fn into_string(self) -> String {
        match self {
            RecordId::Text(s) => s.trim().to_string(),
            RecordId::Number(n) => n.to_string(),
        }
    }
}

/// Exported timestamps are either epoch seconds or a date string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Seconds(i64),
    Text(String),
}

impl Timestamp {
    pub fn to_seconds(&self) -> Option<i64> {
        match self {
            Timestamp::Seconds(s) => Some(*s),
            Timestamp::Text(s) => parse_date_text(s.trim()),
        }
    }
}

fn parse_date_text(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// A resolved external track.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Track {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

impl Track {
    /// Link text: `artist - title`, whichever parts are known, else the URL.
    pub fn label(&self) -> String {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => format!("{} - {}", artist, title),
            (None, Some(title)) => title.clone(),
            (Some(artist), None) => artist.clone(),
            (None, None) => self.url.clone(),
        }
    }
}

/// Catalogue entry in the array form of the export.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackRecord {
    #[serde(alias = "work")]
    pub signature: String,
    #[serde(flatten)]
    pub track: Track,
}

/// Structured metadata for one work.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub illustrations: Vec<String>,
    #[serde(default)]
    pub author_age: Option<u32>,
    #[serde(default)]
    pub author_birth_year: Option<i32>,
    #[serde(default)]
    pub published: Option<NaiveDate>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Article {
    /// Approximate author age at publication.
    ///
    /// An explicit `author_age` wins; otherwise it is derived from the birth
    /// year and the publication date when both are known.
    pub fn approximate_age(&self) -> Option<u32> {
        if let Some(age) = self.author_age {
            return Some(age);
        }
        let birth = self.author_birth_year?;
        let published = self.published?;
        use chrono::Datelike;
        let age = published.year() - birth;
        u32::try_from(age).ok().filter(|a| *a > 0 && *a < 130)
    }
}

/// One record of the exported search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    pub id: String,
    pub path: String,
    pub title: Option<String>,
    pub text: String,
    pub tags: Vec<String>,
    pub author: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_forms() {
        assert_eq!(Timestamp::Seconds(100).to_seconds(), Some(100));
        assert_eq!(
            Timestamp::Text("1970-01-01T00:01:40".into()).to_seconds(),
            Some(100)
        );
        assert_eq!(
            Timestamp::Text("1970-01-01 00:01:40".into()).to_seconds(),
            Some(100)
        );
        assert_eq!(
            Timestamp::Text("1970-01-01T01:01:40+01:00".into()).to_seconds(),
            Some(100)
        );
        assert_eq!(Timestamp::Text("1970-01-02".into()).to_seconds(), Some(86_400));
        assert_eq!(Timestamp::Text("yesterday".into()).to_seconds(), None);
    }

    #[test]
    fn comment_record_aliases() {
        let rec: CommentRecord =
            serde_json::from_str(r#"{"name":"A","t":100,"text":"hi","parent_id":"c1"}"#).unwrap();
        assert_eq!(rec.author, "A");
        assert_eq!(rec.body, "hi");
        assert_eq!(rec.parent, Some(RecordId::Text("c1".into())));
        assert_eq!(rec.timestamp.to_seconds(), Some(100));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let rec: CommentRecord = serde_json::from_str(
            r#"{"id":1,"thread":7,"author":"A","t":5,"body":"x","parent":"0"}"#,
        )
        .unwrap();
        assert_eq!(rec.id.map(RecordId::into_string).as_deref(), Some("1"));
        assert_eq!(rec.thread.map(RecordId::into_string).as_deref(), Some("7"));
        assert_eq!(rec.parent.map(RecordId::into_string).as_deref(), Some("0"));
    }

    #[test]
    fn approximate_age_prefers_explicit() {
        let mut a: Article = serde_json::from_str(r#"{"id":"7"}"#).unwrap();
        assert_eq!(a.approximate_age(), None);
        a.author_birth_year = Some(1990);
        a.published = NaiveDate::from_ymd_opt(2014, 6, 1);
        assert_eq!(a.approximate_age(), Some(24));
        a.author_age = Some(17);
        assert_eq!(a.approximate_age(), Some(17));
    }

    #[test]
    fn implausible_derived_age_is_dropped() {
        let a = Article {
            author_birth_year: Some(2020),
            published: NaiveDate::from_ymd_opt(2014, 6, 1),
            ..serde_json::from_str(r#"{"id":"1"}"#).unwrap()
        };
        assert_eq!(a.approximate_age(), None);
    }

    #[test]
    fn display_date() {
        let c = Comment {
            id: "1".into(),
            thread: "7".into(),
            author: "A".into(),
            avatar: None,
            title: None,
            timestamp: 86_400 + 3_660,
            body: String::new(),
            parent: None,
            parent_text: None,
        };
        assert_eq!(c.display_date(), "1970-01-02 01:01");
    }
}

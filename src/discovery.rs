//! Page discovery over the source mirror.
//!
//! Walks the mirror lazily in lexicographic order (per path component, via
//! `walkdir`'s sorted traversal) and yields the relative paths of HTML
//! documents. Discovering twice over an unchanged mirror yields the same
//! sequence, which is what keeps the search index ordering reproducible.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;

/// A document found in the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePath {
    /// Relative path with `/` separators; the document identity.
    pub relative: String,
    pub absolute: PathBuf,
}

/// Restartable page discovery. Each call to [`iter`](PageDiscovery::iter)
/// starts a fresh walk.
pub struct PageDiscovery {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl PageDiscovery {
    pub fn new(root: &Path, include_globs: &[String], exclude_globs: &[String]) -> Result<Self> {
        if !root.is_dir() {
            bail!("Source root does not exist: {}", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
            include: build_globset(include_globs)?,
            exclude: build_globset(exclude_globs)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.paths.source_root,
            &config.pipeline.include_globs,
            &config.pipeline.exclude_globs,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a relative path is a page (as opposed to an asset).
    pub fn is_page(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Lazily walk the mirror, yielding pages in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = Result<PagePath>> + '_ {
        self.walk_files().filter_map(move |entry| match entry {
            Ok((relative, absolute)) => self
                .is_page(&relative)
                .then_some(Ok(PagePath { relative, absolute })),
            Err(e) => Some(Err(e)),
        })
    }

    /// Every regular file under the root, as `(relative, absolute)`.
    pub(crate) fn walk_files(&self) -> impl Iterator<Item = Result<(String, PathBuf)>> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(e.into())),
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                let path = entry.path();
                let relative = path.strip_prefix(&self.root).unwrap_or(path);
                Some(Ok((relative_key(relative), path.to_path_buf())))
            })
    }
}

/// `/`-separated form of a relative path, independent of the platform.
fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

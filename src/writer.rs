//! Output tree writer.
//!
//! Mirrors source-relative paths under the output root, creating parent
//! directories as needed. Every file that passes through the writer is
//! hashed, and [`OutputWriter::digest`] folds those hashes (sorted by path)
//! into one SHA-256 that identifies the whole output tree: two runs over an
//! unchanged mirror report the same digest.
//!
//! In dry-run mode nothing touches the disk, but hashing still happens.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::config::CssPatch;
use crate::discovery::PageDiscovery;
use crate::error::OutputError;

const WRITE_CHECK_FILE: &str = ".mirror-write-check";

pub struct OutputWriter {
    root: PathBuf,
    dry_run: bool,
    /// Content hash per relative path; a rewrite replaces the earlier hash.
    hashes: Mutex<BTreeMap<String, [u8; 32]>>,
}

impl OutputWriter {
    /// Prepare the output root. Failing to create it, or to write a file in
    /// it, is fatal for the run.
    pub fn new(root: &Path, dry_run: bool) -> Result<Self, OutputError> {
        if !dry_run {
            std::fs::create_dir_all(root).map_err(|source| OutputError::Unwritable {
                path: root.to_path_buf(),
                source,
            })?;
            let check = root.join(WRITE_CHECK_FILE);
            std::fs::write(&check, b"check")
                .and_then(|_| std::fs::remove_file(&check))
                .map_err(|source| OutputError::Unwritable {
                    path: root.to_path_buf(),
                    source,
                })?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            dry_run,
            hashes: Mutex::new(BTreeMap::new()),
        })
    }

    /// Write `contents` at `relative` under the output root.
    pub fn write(&self, relative: &str, contents: &[u8]) -> Result<(), OutputError> {
        if !self.dry_run {
            let target = self.target(relative);
            self.ensure_parent(&target)?;
            std::fs::write(&target, contents).map_err(|source| OutputError::Write {
                path: target.clone(),
                source,
            })?;
        }
        self.record(relative, contents);
        Ok(())
    }

    /// Copy a file byte-for-byte to `relative` under the output root.
    pub fn copy(&self, from: &Path, relative: &str) -> Result<(), OutputError> {
        let target = self.target(relative);
        let bytes = std::fs::read(from).map_err(|source| OutputError::Copy {
            from: from.to_path_buf(),
            to: target.clone(),
            source,
        })?;
        self.write(relative, &bytes)
    }

    /// Copy every non-page file of the mirror. Returns per-file failures;
    /// none of them stops the copy.
    pub fn copy_assets(&self, discovery: &PageDiscovery) -> Vec<(String, OutputError)> {
        let mut failures = Vec::new();
        let mut copied = 0usize;
        for entry in discovery.walk_files() {
            let (relative, absolute) = match entry {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable mirror entry");
                    continue;
                }
            };
            if discovery.is_page(&relative) {
                continue;
            }
            match self.copy(&absolute, &relative) {
                Ok(()) => copied += 1,
                Err(e) => failures.push((relative, e)),
            }
        }
        tracing::info!(copied, failed = failures.len(), "copied assets");
        failures
    }

    /// Literal find/replace on already-copied stylesheets.
    pub fn apply_css_patches(&self, patches: &[CssPatch]) -> Vec<(String, OutputError)> {
        let mut failures = Vec::new();
        for patch in patches {
            let relative = patch.path.to_string_lossy().replace('\\', "/");
            let target = self.target(&relative);
            if self.dry_run {
                continue;
            }
            let css = match std::fs::read_to_string(&target) {
                Ok(css) => css,
                Err(source) => {
                    failures.push((relative, OutputError::Write { path: target, source }));
                    continue;
                }
            };
            if !css.contains(&patch.find) {
                tracing::debug!(path = %relative, "css patch target text not found");
                continue;
            }
            let patched = css.replace(&patch.find, &patch.replace);
            if let Err(e) = self.write(&relative, patched.as_bytes()) {
                failures.push((relative, e));
            }
        }
        failures
    }

    /// SHA-256 over every written path and its contents, in path order.
    pub fn digest(&self) -> String {
        let hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        let mut hasher = Sha256::new();
        for (path, hash) in hashes.iter() {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(hash);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Number of files written (or that would have been, in dry-run).
    pub fn written(&self) -> usize {
        self.hashes.lock().map(|h| h.len()).unwrap_or(0)
    }

    fn record(&self, relative: &str, contents: &[u8]) {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&Sha256::digest(contents));
        let mut hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes.insert(relative.to_string(), hash);
    }

    fn target(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn ensure_parent(&self, target: &Path) -> Result<(), OutputError> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| OutputError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn writes_nested_paths() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("site");
        let writer = OutputWriter::new(&out, false).unwrap();
        writer.write("works/7.html", b"<p>7</p>").unwrap();
        assert_eq!(fs::read_to_string(out.join("works/7.html")).unwrap(), "<p>7</p>");
        assert!(!out.join(WRITE_CHECK_FILE).exists());
        assert_eq!(writer.written(), 1);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("site");
        let writer = OutputWriter::new(&out, true).unwrap();
        writer.write("a.html", b"x").unwrap();
        assert!(!out.exists());
        assert_eq!(writer.written(), 1);
    }

    #[test]
    fn unwritable_root_is_reported() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "not a dir").unwrap();
        let err = OutputWriter::new(&blocker.join("site"), false).err().unwrap();
        assert!(matches!(err, OutputError::Unwritable { .. }));
    }

    #[test]
    fn digest_is_order_independent() {
        let tmp = TempDir::new().unwrap();
        let a = OutputWriter::new(&tmp.path().join("a"), true).unwrap();
        a.write("x.html", b"1").unwrap();
        a.write("y.html", b"2").unwrap();
        let b = OutputWriter::new(&tmp.path().join("b"), true).unwrap();
        b.write("y.html", b"2").unwrap();
        b.write("x.html", b"1").unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        b.write("x.html", b"changed").unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn rewrite_replaces_earlier_hash() {
        let tmp = TempDir::new().unwrap();
        let a = OutputWriter::new(&tmp.path().join("a"), true).unwrap();
        a.write("css/site.css", b"old").unwrap();
        a.write("css/site.css", b"new").unwrap();
        assert_eq!(a.written(), 1);

        let b = OutputWriter::new(&tmp.path().join("b"), true).unwrap();
        b.write("css/site.css", b"new").unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn css_patch_applies_to_copied_asset() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("site");
        let writer = OutputWriter::new(&out, false).unwrap();
        writer
            .write("css/template.css", b"body{background:url(http://dead/bg.png)}")
            .unwrap();
        let failures = writer.apply_css_patches(&[
            CssPatch {
                path: PathBuf::from("css/template.css"),
                find: "http://dead/bg.png".to_string(),
                replace: "../images/bg.png".to_string(),
            },
            CssPatch {
                path: PathBuf::from("css/missing.css"),
                find: "x".to_string(),
                replace: "y".to_string(),
            },
        ]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "css/missing.css");
        assert_eq!(
            fs::read_to_string(out.join("css/template.css")).unwrap(),
            "body{background:url(../images/bg.png)}"
        );
    }
}

use crate::config::{AdsConfig, Fingerprint};
use crate::datasets::Datasets;
use crate::document::Document;
use crate::error::StageError;

use super::Stage;

/// Removes known ad and spam shapes.
pub struct AdStripper {
    fingerprints: Vec<Fingerprint>,
}

impl AdStripper {
    pub fn new(config: &AdsConfig) -> Self {
        Self {
            fingerprints: config.fingerprints.clone(),
        }
    }
}

impl Stage for AdStripper {
    fn name(&self) -> &'static str {
        "ads"
    }

    fn description(&self) -> &'static str {
        "Strip ad and spam markup"
    }

    fn apply(&self, doc: &mut Document, _data: &Datasets) -> Result<(), StageError> {
        let mut removed = 0usize;
        for fingerprint in &self.fingerprints {
            for el in doc.select(&fingerprint.selector)? {
                let matches = match &fingerprint.contains {
                    Some(needle) => el.text_contents().contains(needle.as_str()),
                    None => true,
                };
                if matches {
                    el.as_node().detach();
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::debug!(path = doc.path(), removed, "stripped ad markup");
        }
        Ok(())
    }
}

use crate::config::AnnotateConfig;
use crate::datasets::Datasets;
use crate::document::{self, set_text, Document};
use crate::error::StageError;

use super::Stage;

/// Appends the author's approximate age after the byline of a work page.
pub struct AgeAnnotator {
    byline: String,
    label: String,
}

impl AgeAnnotator {
    pub fn new(config: &AnnotateConfig) -> Self {
        Self {
            byline: config.byline.clone(),
            label: config.label.clone(),
        }
    }

    fn format(&self, age: u32) -> String {
        format!(" ({})", self.label.replace("{age}", &age.to_string()))
    }
}

impl Stage for AgeAnnotator {
    fn name(&self) -> &'static str {
        "age"
    }

    fn description(&self) -> &'static str {
        "Annotate author bylines with approximate age"
    }

    fn apply(&self, doc: &mut Document, data: &Datasets) -> Result<(), StageError> {
        let Some(age) = data
            .find_metadata(doc.page_id())
            .and_then(|article| article.approximate_age())
        else {
            return Ok(());
        };
        if doc.exists("[data-mirror-age]")? {
            return Ok(());
        }
        let Some(byline) = doc.select_first(&self.byline)? else {
            return Ok(());
        };

        let span = document::element(r#"<span class="mirror-author-age" data-mirror-age></span>"#)?;
        set_text(&span, &self.format(age));
        byline.as_node().insert_after(span);
        Ok(())
    }
}

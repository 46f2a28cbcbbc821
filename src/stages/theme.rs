use crate::config::ThemeConfig;
use crate::datasets::Datasets;
use crate::document::{self, attr, set_attr, set_text, Document};
use crate::error::StageError;

use super::Stage;

const BODY_CLASS: &str = "mirror-dark";

/// Adds the dark theme stylesheet, the body class and a toggle button.
pub struct DarkThemeInjector {
    stylesheet: String,
    toggle_label: String,
}

impl DarkThemeInjector {
    pub fn new(config: &ThemeConfig) -> Self {
        Self {
            stylesheet: config.stylesheet.trim_start_matches('/').to_string(),
            toggle_label: config.toggle_label.clone(),
        }
    }
}

impl Stage for DarkThemeInjector {
    fn name(&self) -> &'static str {
        "dark_theme"
    }

    fn description(&self) -> &'static str {
        "Inject the dark theme stylesheet and toggle"
    }

    fn apply(&self, doc: &mut Document, _data: &Datasets) -> Result<(), StageError> {
        // Frameset pages have no body to theme.
        let Some(body) = doc.select_first("body")? else {
            return Ok(());
        };
        let body = body.as_node().clone();
        let head = doc.head()?;

        if !doc.exists("link[data-mirror-theme]")? {
            let link = document::element(r#"<link rel="stylesheet" data-mirror-theme>"#)?;
            set_attr(&link, "href", &format!("{}{}", doc.root_prefix(), self.stylesheet));
            head.append(link);
        }

        let classes = attr(&body, "class").unwrap_or_default();
        if !classes.split_whitespace().any(|c| c == BODY_CLASS) {
            let merged = if classes.trim().is_empty() {
                BODY_CLASS.to_string()
            } else {
                format!("{} {}", classes.trim(), BODY_CLASS)
            };
            set_attr(&body, "class", &merged);
        }

        if !doc.exists("[data-mirror-theme-toggle]")? {
            let toggle = document::element(
                r#"<button type="button" class="mirror-theme-toggle" data-mirror-theme-toggle onclick="document.body.classList.toggle('mirror-dark')"></button>"#,
            )?;
            set_text(&toggle, &self.toggle_label);
            body.prepend(toggle);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{apply_twice, config, doc};

    fn stage() -> DarkThemeInjector {
        DarkThemeInjector::new(&config().theme)
    }

    #[test]
    fn injects_link_class_and_toggle() {
        let html = apply_twice(
            &stage(),
            "works/7.html",
            r#"<html><head><title>t</title></head><body class="page"><p>x</p></body></html>"#,
            &Datasets::default(),
        );
        let d = doc("works/7.html", &html);
        let links = d.select("link[data-mirror-theme]").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(
            attr(links[0].as_node(), "href").as_deref(),
            Some("../assets/mirror-dark.css")
        );
        let body = d.body().unwrap();
        assert_eq!(attr(&body, "class").as_deref(), Some("page mirror-dark"));
        assert_eq!(d.select(".mirror-theme-toggle").unwrap().len(), 1);
    }

    #[test]
    fn works_without_head_or_body_tags() {
        let html = apply_twice(&stage(), "index.htm", "just text", &Datasets::default());
        let d = doc("index.htm", &html);
        assert!(d.exists("head link[data-mirror-theme]").unwrap());
        assert_eq!(
            attr(d.select_first("link").unwrap().unwrap().as_node(), "href").as_deref(),
            Some("assets/mirror-dark.css")
        );
    }

    #[test]
    fn frameset_page_is_left_alone() {
        let mut d = doc("frames.html", "<frameset><frame src=a.html></frameset>");
        let before = d.serialize().unwrap();
        stage().apply(&mut d, &Datasets::default()).unwrap();
        assert_eq!(d.serialize().unwrap(), before);
    }
}

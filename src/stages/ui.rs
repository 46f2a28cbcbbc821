//! Targeted structural corrections.
//!
//! Each fix either inserts markup guarded by a marker attribute or replaces
//! a scraped value with a configured constant. A replaced value is kept in a
//! `data-mirror-original-*` attribute on the same element, so the captured
//! content stays recoverable from the output.

use kuchikikiki::NodeRef;
use url::Url;

use crate::config::{ImageFix, UiConfig};
use crate::datasets::{mirror_root, Datasets};
use crate::document::{self, attr, has_attr, select_in, set_attr, set_text, tag_name, Document};
use crate::error::StageError;

use super::Stage;

pub struct UiFixer {
    config: UiConfig,
}

impl UiFixer {
    pub fn new(config: &UiConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn fix_slogan(&self, doc: &Document) -> Result<(), StageError> {
        let Some(slogan) = &self.config.slogan else {
            return Ok(());
        };
        if let Some(el) = doc.select_first(&self.config.slogan_selector)? {
            let current = el.text_contents();
            if current.trim() != slogan.trim() {
                let node = el.as_node();
                if !has_attr(node, "data-mirror-original-text") {
                    set_attr(node, "data-mirror-original-text", current.trim());
                }
                set_text(node, slogan);
            }
        }
        Ok(())
    }

    fn add_homepage_block(&self, doc: &Document) -> Result<(), StageError> {
        let Some(html) = &self.config.homepage_html else {
            return Ok(());
        };
        if doc.path() != self.config.homepage || doc.exists("[data-mirror-homepage]")? {
            return Ok(());
        }
        let Some(container) = doc.select_first(&self.config.homepage_container)? else {
            return Ok(());
        };
        let block = document::element(r#"<div class="mirror-homepage" data-mirror-homepage></div>"#)?;
        document::append_all(&block, document::fragment(html));
        container.as_node().append(block);
        Ok(())
    }

    fn add_archive_note(&self, doc: &Document) -> Result<(), StageError> {
        let Some(note) = &self.config.archive_note else {
            return Ok(());
        };
        if doc.exists("[data-mirror-archive-note]")? {
            return Ok(());
        }
        let Some(footer) = doc.select_first(&self.config.footer_selector)? else {
            return Ok(());
        };
        let p = document::element(r#"<p class="mirror-archive-note" data-mirror-archive-note></p>"#)?;
        set_text(&p, note);
        footer.as_node().append(p);
        Ok(())
    }

    fn fix_images(&self, doc: &Document, fix: &ImageFix) -> Result<(), StageError> {
        for img in doc.select(&fix.selector)? {
            let node = img.as_node();
            let current = attr(node, "src");
            if current.as_deref() != Some(fix.src.as_str()) {
                if let Some(original) = current {
                    if !has_attr(node, "data-mirror-original-src") {
                        set_attr(node, "data-mirror-original-src", &original);
                    }
                }
                set_attr(node, "src", &fix.src);
                set_attr(node, "data-mirror-fixed", "");
            }
        }
        Ok(())
    }

    /// Make the lead image of each teaser open the full article.
    fn link_images(&self, doc: &Document) -> Result<(), StageError> {
        for article in doc.select("article")? {
            let article = article.as_node();
            let Some(href) = select_in(article, ".readmore a[href]")?
                .into_iter()
                .next()
                .and_then(|a| attr(a.as_node(), "href"))
            else {
                continue;
            };
            let Some(img) = select_in(article, "img")?.into_iter().next() else {
                continue;
            };
            let img = img.as_node();
            if img.ancestors().any(|a| tag_name(&a).as_deref() == Some("a")) {
                continue;
            }
            let link = document::element(r#"<a class="mirror-image-link"></a>"#)?;
            set_attr(&link, "href", &href);
            img.insert_before(link.clone());
            link.append(img.clone());
        }
        Ok(())
    }

    /// List every known work on its author's page.
    fn complete_author_works(&self, doc: &Document, data: &Datasets) -> Result<(), StageError> {
        let prefix = doc.root_prefix();
        let Some(root) = mirror_root() else {
            return Ok(());
        };
        let Ok(page) = root.join(doc.path()) else {
            return Ok(());
        };
        for container in doc.select(&self.config.author_list_selector)? {
            let container = container.as_node();
            let Some(author) = attr(container, "data-author") else {
                continue;
            };
            let works = data.articles.works_by_author(author.trim());
            if works.is_empty() {
                continue;
            }

            let linked: Vec<String> = select_in(container, "a[href]")?
                .iter()
                .filter_map(|a| attr(a.as_node(), "href"))
                .filter_map(|href| mirror_path(&page, &href))
                .collect();

            let mut added = Vec::new();
            for id in works {
                let template = self.config.work_path_template.replace("{id}", id);
                let Some(path) = mirror_path(&root, &template) else {
                    continue;
                };
                if linked.contains(&path) {
                    continue;
                }
                let title = data
                    .find_metadata(id)
                    .and_then(|a| a.title.clone())
                    .unwrap_or_else(|| id.clone());
                let li = document::element(
                    r#"<li class="mirror-added-work"><a data-mirror-added-work></a></li>"#,
                )?;
                if let Some(a) = select_in(&li, "a")?.into_iter().next() {
                    set_attr(a.as_node(), "href", &format!("{}{}", prefix, path));
                    set_text(a.as_node(), &title);
                }
                added.push(li);
            }
            if added.is_empty() {
                continue;
            }

            tracing::debug!(path = doc.path(), author = %author, added = added.len(), "completed author works");
            let list = added_works_list(container)?;
            document::append_all(&list, added);
        }
        Ok(())
    }
}

impl Stage for UiFixer {
    fn name(&self) -> &'static str {
        "ui"
    }

    fn description(&self) -> &'static str {
        "Apply UI fixes and complete author work lists"
    }

    fn apply(&self, doc: &mut Document, data: &Datasets) -> Result<(), StageError> {
        self.fix_slogan(doc)?;
        self.add_homepage_block(doc)?;
        self.add_archive_note(doc)?;
        for fix in &self.config.image_fixes {
            self.fix_images(doc, fix)?;
        }
        if self.config.clickable_images {
            self.link_images(doc)?;
        }
        self.complete_author_works(doc, data)
    }
}

/// The list new work links go into: the container itself when it is a
/// list, otherwise a marked `<ul>` inside it (created on first use).
fn added_works_list(container: &NodeRef) -> Result<NodeRef, StageError> {
    if matches!(tag_name(container).as_deref(), Some("ul") | Some("ol")) {
        return Ok(container.clone());
    }
    if let Some(existing) = select_in(container, "ul[data-mirror-added-works]")?
        .into_iter()
        .next()
    {
        return Ok(existing.as_node().clone());
    }
    let list = document::element(r#"<ul class="mirror-added-works" data-mirror-added-works></ul>"#)?;
    container.append(list.clone());
    Ok(list)
}

/// Mirror-root-relative path an href points at, resolved against `base`.
/// `None` for links that leave the mirror (another scheme or host).
fn mirror_path(base: &Url, href: &str) -> Option<String> {
    let url = base.join(href.trim()).ok()?;
    if url.scheme() != "file" || url.host().is_some() {
        return None;
    }
    let path = url.path().trim_start_matches('/');
    let path = urlencoding::decode(path).ok()?;
    Some(path.into_owned())
}

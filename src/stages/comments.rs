//! Restores archived comment threads into the page's (empty) comment list.
//!
//! The original comment widget loaded threads from a third-party service
//! that no longer exists, so crawled pages only carry an empty container.
//! The archived thread for the page is rendered into that container as
//! nested lists:
//!
//! ```text
//! <li class="mirror-comment" data-mirror-comment data-comment-id="…">
//!   header (avatar, author, date) · title · quote · body
//!   <ul class="mirror-replies"> … replies … </ul>
//! </li>
//! ```
//!
//! Siblings appear in ascending timestamp order (archive order breaks
//! ties). A reply whose parent is not in the thread is shown at top level
//! rather than dropped.
//!
//! Archived bodies are untrusted markup, and some of it (a stray `<li>`,
//! say) is restructured by the parser once the page is read back. The
//! rendered thread is therefore round-tripped through the parser in the
//! context of the list it goes into, and every resulting top-level node is
//! tagged `data-mirror-comment-part`. A later pass removes all tagged nodes
//! and renders again, which is what makes the stage a fixed point.

use std::collections::{HashMap, HashSet};

use chrono::DateTime;
use kuchikikiki::NodeRef;

use crate::config::CommentsConfig;
use crate::datasets::Datasets;
use crate::document::{self, select_in, set_attr, set_text, tag_name, Document};
use crate::error::StageError;
use crate::models::Comment;

use super::Stage;

const PART: &str = "data-mirror-comment-part";

const COMMENT_SKELETON: &str = concat!(
    r#"<li class="mirror-comment" data-mirror-comment>"#,
    r#"<div class="mirror-comment-header">"#,
    r#"<span class="mirror-comment-author"></span> "#,
    r#"<time class="mirror-comment-date"></time>"#,
    r#"</div>"#,
    r#"<div class="mirror-comment-body"></div>"#,
    r#"</li>"#
);

pub struct CommentRestorer {
    container: String,
    empty_placeholder: String,
}

impl CommentRestorer {
    pub fn new(config: &CommentsConfig) -> Self {
        Self {
            container: config.container.clone(),
            empty_placeholder: config.empty_placeholder.clone(),
        }
    }
}

impl Stage for CommentRestorer {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn description(&self) -> &'static str {
        "Restore archived comment threads"
    }

    fn apply(&self, doc: &mut Document, data: &Datasets) -> Result<(), StageError> {
        let Some(thread) = data.find_comments(doc.page_id()) else {
            return Ok(());
        };
        let Some(container) = doc.select_first(&self.container)? else {
            tracing::debug!(path = doc.path(), "page has a comment thread but no container");
            return Ok(());
        };
        let container = container.as_node().clone();

        for previous in select_in(&container, "[data-mirror-comments], [data-mirror-comment-part]")? {
            previous.as_node().detach();
        }

        let items = render_thread(thread)?;
        match tag_name(&container).as_deref() {
            Some(list @ ("ul" | "ol")) => {
                document::append_all(&container, settle(items, list)?);
            }
            _ => {
                let list = document::element(r#"<ul class="mirror-comments" data-mirror-comments></ul>"#)?;
                document::append_all(&list, settle(items, "ul")?);
                container.append(list);
            }
        }

        doc.remove(&self.empty_placeholder)?;

        if let Some(css) = &data.comments_css {
            if !doc.exists("style[data-mirror-comments-css]")? {
                let style = document::element(r#"<style data-mirror-comments-css></style>"#)?;
                set_text(&style, css);
                doc.head()?.append(style);
            }
        }

        tracing::debug!(path = doc.path(), comments = thread.len(), "restored comment thread");
        Ok(())
    }
}

/// Render a timestamp-sorted thread into top-level `<li>` nodes.
fn render_thread(thread: &[Comment]) -> Result<Vec<NodeRef>, StageError> {
    let ids: HashSet<&str> = thread.iter().map(|c| c.id.as_str()).collect();
    let mut replies: HashMap<&str, Vec<&Comment>> = HashMap::new();
    let mut roots: Vec<&Comment> = Vec::new();

    for comment in thread {
        match comment.parent.as_deref() {
            Some(parent) if parent != comment.id && ids.contains(parent) => {
                replies.entry(parent).or_default().push(comment)
            }
            _ => roots.push(comment),
        }
    }

    let mut rendered: HashSet<&str> = HashSet::new();
    let mut items = Vec::new();
    for root in roots {
        items.push(render_comment(root, &replies, &mut rendered)?);
    }
    // Reply cycles never reach a root; surface them at top level.
    for comment in thread {
        if !rendered.contains(comment.id.as_str()) {
            items.push(render_comment(comment, &replies, &mut rendered)?);
        }
    }
    Ok(items)
}

fn render_comment<'a>(
    comment: &'a Comment,
    replies: &HashMap<&str, Vec<&'a Comment>>,
    rendered: &mut HashSet<&'a str>,
) -> Result<NodeRef, StageError> {
    rendered.insert(comment.id.as_str());

    let li = document::element(COMMENT_SKELETON)?;
    set_attr(&li, "data-comment-id", &comment.id);

    let header = first(&li, ".mirror-comment-header")?;
    if let Some(avatar) = &comment.avatar {
        let img = document::element(r#"<img class="mirror-comment-avatar" alt="">"#)?;
        set_attr(&img, "src", avatar);
        header.prepend(img);
    }
    set_text(&first(&li, ".mirror-comment-author")?, &comment.author);

    let time = first(&li, ".mirror-comment-date")?;
    set_text(&time, &comment.display_date());
    if let Some(dt) = DateTime::from_timestamp(comment.timestamp, 0) {
        set_attr(&time, "datetime", &dt.to_rfc3339());
    }

    let body = first(&li, ".mirror-comment-body")?;
    if let Some(title) = &comment.title {
        let div = document::element(r#"<div class="mirror-comment-title"></div>"#)?;
        set_text(&div, title);
        body.insert_before(div);
    }
    if let Some(quote) = &comment.parent_text {
        let blockquote = document::element(r#"<blockquote class="mirror-comment-quote"></blockquote>"#)?;
        set_text(&blockquote, quote);
        body.insert_before(blockquote);
    }
    document::append_all(&body, document::fragment(&comment.body));

    if let Some(children) = replies.get(comment.id.as_str()) {
        let list = document::element(r#"<ul class="mirror-replies"></ul>"#)?;
        for child in children {
            if rendered.contains(child.id.as_str()) {
                continue;
            }
            list.append(render_comment(child, replies, rendered)?);
        }
        li.append(list);
    }

    Ok(li)
}

/// Round-trip rendered items through the parser inside a `<context>` list
/// and tag every top-level node, so what is inserted is exactly what a
/// later parse of the page yields. Stray top-level text is wrapped in an
/// item so it can be tagged too.
fn settle(items: Vec<NodeRef>, context: &str) -> Result<Vec<NodeRef>, StageError> {
    let mut html = String::new();
    for item in &items {
        html.push_str(&document::outer_html(item)?);
    }

    let mut parts = Vec::new();
    for node in document::fragment_in(context, &html) {
        if node.as_element().is_some() {
            set_attr(&node, PART, "");
            parts.push(node);
            continue;
        }
        let blank = node
            .as_text()
            .map(|text| text.borrow().trim().is_empty())
            .unwrap_or(true);
        if blank {
            continue;
        }
        let li = document::element(r#"<li class="mirror-comment-fragment" data-mirror-comment-part></li>"#)?;
        li.append(node);
        parts.push(li);
    }
    Ok(parts)
}

fn first(node: &NodeRef, selector: &str) -> Result<NodeRef, StageError> {
    select_in(node, selector)?
        .into_iter()
        .next()
        .map(|el| el.as_node().clone())
        .ok_or_else(|| StageError::recoverable(format!("comment template lacks {}", selector)))
}

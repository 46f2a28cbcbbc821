//! Points embedded players at their resolved tracks.
//!
//! The signature of an embed is its `data-track` attribute, or else the stem
//! of the last path segment of its `src` (`data` for `<object>`). Resolved
//! embeds are marked with `data-mirror-track` and skipped on later passes;
//! unresolved ones are left exactly as scraped.

use kuchikikiki::NodeRef;

use crate::config::MusicConfig;
use crate::datasets::{url_stem, Datasets};
use crate::document::{self, attr, has_attr, set_attr, set_text, tag_name, Document};
use crate::error::StageError;
use crate::models::Track;

use super::Stage;

const MARKER: &str = "data-mirror-track";

pub struct MusicLinkResolver {
    embed_selector: String,
}

impl MusicLinkResolver {
    pub fn new(config: &MusicConfig) -> Self {
        Self {
            embed_selector: config.embed_selector.clone(),
        }
    }
}

impl Stage for MusicLinkResolver {
    fn name(&self) -> &'static str {
        "music"
    }

    fn description(&self) -> &'static str {
        "Resolve embedded players against the music catalogue"
    }

    fn apply(&self, doc: &mut Document, data: &Datasets) -> Result<(), StageError> {
        let mut resolved = 0usize;
        for embed in doc.select(&self.embed_selector)? {
            let node = embed.as_node();
            if has_attr(node, MARKER) {
                continue;
            }
            let Some(signature) = signature(node) else {
                continue;
            };
            let Some(track) = data.find_track(&signature) else {
                tracing::debug!(path = doc.path(), signature = %signature, "unresolved player signature");
                continue;
            };
            rewrite(node, &signature, track)?;
            resolved += 1;
        }
        if resolved > 0 {
            tracing::debug!(path = doc.path(), resolved, "resolved music embeds");
        }
        Ok(())
    }
}

/// Attribute holding the player URL for this element, if it has one.
fn url_attribute(node: &NodeRef) -> Option<&'static str> {
    if tag_name(node).as_deref() == Some("object") {
        return has_attr(node, "data").then_some("data");
    }
    ["src", "href"].into_iter().find(|name| has_attr(node, name))
}

/// Catalogue key of an embed.
pub fn signature(node: &NodeRef) -> Option<String> {
    if let Some(track) = attr(node, "data-track") {
        let track = track.trim();
        if !track.is_empty() {
            return Some(track.to_string());
        }
    }
    let name = url_attribute(node)?;
    url_stem(&attr(node, name)?)
}

fn rewrite(node: &NodeRef, signature: &str, track: &Track) -> Result<(), StageError> {
    match url_attribute(node) {
        Some(name) => {
            if let Some(original) = attr(node, name) {
                set_attr(node, "data-mirror-original-src", &original);
            }
            set_attr(node, name, &track.url);
        }
        None => {
            // A bare `data-track` placeholder: give it something to click.
            let link = document::element(r#"<a class="mirror-track-link" rel="noopener"></a>"#)?;
            set_attr(&link, "href", &track.url);
            set_text(&link, &track.label());
            node.append(link);
        }
    }
    set_attr(node, MARKER, signature);
    if let Some(title) = &track.title {
        if !has_attr(node, "title") {
            set_attr(node, "title", title);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::MusicCatalogue;
    use crate::stages::test_support::{apply_twice, config, doc};

    fn stage() -> MusicLinkResolver {
        MusicLinkResolver::new(&config().music)
    }

    fn datasets() -> Datasets {
        Datasets {
            music: MusicCatalogue::from_tracks([
                (
                    "track-1".to_string(),
                    Track {
                        url: "https://music.example/t/1".to_string(),
                        title: Some("Rain".to_string()),
                        artist: Some("Band".to_string()),
                    },
                ),
                (
                    "track-2".to_string(),
                    Track {
                        url: "https://music.example/t/2".to_string(),
                        title: None,
                        artist: None,
                    },
                ),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn signature_rules() {
        let d = doc(
            "a.html",
            r#"<iframe id="a" src="https://old.player/embed/track-1.swf?autoplay=1"></iframe>
<object id="b" data="/flash/track-2.swf"></object>
<div id="c" data-track=" track-3 "></div>
<audio id="d"></audio>"#,
        );
        let sig = |id: &str| signature(d.select_first(id).unwrap().unwrap().as_node());
        assert_eq!(sig("#a").as_deref(), Some("track-1"));
        assert_eq!(sig("#b").as_deref(), Some("track-2"));
        assert_eq!(sig("#c").as_deref(), Some("track-3"));
        assert_eq!(sig("#d"), None);
    }

    #[test]
    fn resolves_and_marks_embeds() {
        let page = r#"<html><body>
<iframe src="https://old.player/embed/track-1"></iframe>
<object data="/flash/track-2.swf"></object>
</body></html>"#;
        let html = apply_twice(&stage(), "works/7.html", page, &datasets());
        let d = doc("works/7.html", &html);

        let iframe = d.select_first("iframe").unwrap().unwrap();
        let iframe = iframe.as_node();
        assert_eq!(attr(iframe, "src").as_deref(), Some("https://music.example/t/1"));
        assert_eq!(
            attr(iframe, "data-mirror-original-src").as_deref(),
            Some("https://old.player/embed/track-1")
        );
        assert_eq!(attr(iframe, "data-mirror-track").as_deref(), Some("track-1"));
        assert_eq!(attr(iframe, "title").as_deref(), Some("Rain"));

        let object = d.select_first("object").unwrap().unwrap();
        assert_eq!(
            attr(object.as_node(), "data").as_deref(),
            Some("https://music.example/t/2")
        );
        assert!(!has_attr(object.as_node(), "title"));
    }

    #[test]
    fn unresolved_embed_is_unchanged() {
        let page = r#"<html><body><p>before</p><iframe src="https://old.player/embed/track-99"></iframe><p>after</p></body></html>"#;
        let mut d = doc("works/7.html", page);
        let before = d.serialize().unwrap();
        stage().apply(&mut d, &datasets()).unwrap();
        assert_eq!(d.serialize().unwrap(), before);
    }

    #[test]
    fn bare_placeholder_gets_link() {
        let page = r#"<html><body><div class="player" data-track="track-1"></div></body></html>"#;
        let html = apply_twice(&stage(), "works/7.html", page, &datasets());
        let d = doc("works/7.html", &html);
        let links = d.select("div.player > a.mirror-track-link").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(
            attr(links[0].as_node(), "href").as_deref(),
            Some("https://music.example/t/1")
        );
        assert_eq!(links[0].text_contents(), "Band - Rain");
    }
}

//! Document builder: Markdown → self-contained XHTML page.
//!
//! Three passes, in order:
//!
//! 1. **Parse + rewrite** (sync) — comrak parses with the GFM-style
//!    extensions; every fenced code block node is replaced by a raw HTML
//!    block holding syntect output, then the tree is serialised.
//! 2. **Image cache** (async) — remote `https` images are swapped for local
//!    copies via [`ImageCache::localize_html`].
//! 3. **Wrap** — the fragment is embedded in the page template together with
//!    the highlighter stylesheet and, if available, an `@font-face` rule.
//!
//! Pass 1 is kept in a plain function: the comrak arena is not `Send` and
//! must be gone before the first `.await`.

use crate::error::PipelineError;
use crate::pipeline::cache::ImageCache;
use crate::pipeline::highlight::{highlight_code, theme_css};
use crate::template::{font_face_css, wrap_document, CUSTOM_FONT_FAMILY, FALLBACK_FONT_STACK};
use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use comrak::{format_html, parse_document, Arena, Options};
use std::path::Path;
use tracing::{debug, warn};

/// A complete HTML page ready for the rendering surface.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub html: String,
    /// `CustomFont` when a font file was embedded, the fallback stack otherwise.
    pub font_family: String,
}

/// Builds [`RenderedDocument`]s.
pub struct DocumentBuilder {
    cache: ImageCache,
    disable_linkify: bool,
    max_images: usize,
}

impl DocumentBuilder {
    pub fn new(cache: ImageCache, disable_linkify: bool, max_images: usize) -> Self {
        Self {
            cache,
            disable_linkify,
            max_images,
        }
    }

    /// Convert `markdown` into a full page, embedding `font_path` when it
    /// names an existing file.
    pub async fn build(
        &self,
        markdown: &str,
        font_path: Option<&Path>,
    ) -> Result<RenderedDocument, PipelineError> {
        let fragment = markdown_to_fragment(markdown, self.disable_linkify)?;
        let fragment = self.cache.localize_html(&fragment, self.max_images).await;

        let (font_face, font_family) = match font_path.and_then(font_file_uri) {
            Some(uri) => (font_face_css(&uri), CUSTOM_FONT_FAMILY.to_string()),
            None => (String::new(), FALLBACK_FONT_STACK.to_string()),
        };

        let html = wrap_document(&font_face, theme_css(), &font_family, &fragment);
        debug!(
            "Built document: {} bytes markdown → {} bytes html (font: {})",
            markdown.len(),
            html.len(),
            font_family
        );
        Ok(RenderedDocument { html, font_family })
    }
}

/// comrak options: tables, strikethrough, footnotes, task lists, dollar
/// math, raw HTML passthrough; bare-URL autolinking only when enabled.
pub fn markdown_options(disable_linkify: bool) -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.table = true;
    ext.strikethrough = true;
    ext.footnotes = true;
    ext.tasklist = true;
    ext.math_dollars = true;
    ext.autolink = !disable_linkify;
    options.render.r#unsafe = true;
    options
}

/// Render Markdown to an HTML fragment with highlighted code blocks.
pub fn markdown_to_fragment(markdown: &str, disable_linkify: bool) -> Result<String, PipelineError> {
    let options = markdown_options(disable_linkify);
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &options);

    let highlighted = highlight_fenced_blocks(root);
    if highlighted > 0 {
        debug!("Highlighted {} fenced code block(s)", highlighted);
    }

    let mut html = String::new();
    format_html(root, &options, &mut html).map_err(|e| PipelineError::Markdown(e.to_string()))?;
    Ok(html)
}

/// Replace each fenced code block with its highlighted HTML. Returns the
/// number of blocks rewritten.
fn highlight_fenced_blocks<'a>(root: &'a AstNode<'a>) -> usize {
    let fenced: Vec<(&'a AstNode<'a>, String, String)> = root
        .descendants()
        .filter_map(|node| {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::CodeBlock(block) if block.fenced => Some((
                    node,
                    block.info.trim().to_string(),
                    block.literal.clone(),
                )),
                _ => None,
            }
        })
        .collect();

    for (node, info, literal) in &fenced {
        let language = info.split_whitespace().next();
        let html = highlight_code(literal, language);
        node.data.borrow_mut().value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
    }
    fenced.len()
}

/// `file://` URI of the canonical font path, if the file exists.
fn font_file_uri(path: &Path) -> Option<String> {
    if !path.is_file() {
        warn!("Font file not found, using fallback fonts: {}", path.display());
        return None;
    }
    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            warn!("Cannot resolve font path {}: {}", path.display(), e);
            return None;
        }
    };
    reqwest::Url::from_file_path(&canonical)
        .ok()
        .map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::pipeline::cache::ImageFetcher;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NoNetwork;

    #[async_trait]
    impl ImageFetcher for NoNetwork {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Request {
                url: url.to_string(),
                reason: "offline".into(),
            })
        }
    }

    fn builder(dir: &TempDir) -> DocumentBuilder {
        DocumentBuilder::new(ImageCache::new(dir.path(), Arc::new(NoNetwork)), true, 3)
    }

    #[test]
    fn fragment_supports_gfm_extensions() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n\nnote[^1]\n\n[^1]: foot\n";
        let html = markdown_to_fragment(md, true).unwrap();
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("type=\"checkbox\""));
        assert!(html.contains("footnote"));
    }

    #[test]
    fn linkify_follows_switch() {
        let md = "see https://example.com now";
        assert!(!markdown_to_fragment(md, true).unwrap().contains("<a "));
        assert!(markdown_to_fragment(md, false).unwrap().contains("<a href=\"https://example.com\""));
    }

    #[test]
    fn fenced_blocks_are_highlighted_or_plain() {
        let html = markdown_to_fragment("```rust\nfn main() {}\n```\n", true).unwrap();
        assert!(html.contains("<div class=\"highlight\">"));

        let html = markdown_to_fragment("```rust-nonexistent\na < b\n```\n", true).unwrap();
        assert!(html.contains("<pre><code>a &lt; b\n</code></pre>"), "got {html}");
        assert!(!html.contains("language-rust-nonexistent"));
    }

    #[test]
    fn raw_html_passes_through() {
        let html = markdown_to_fragment("<div class=\"x\">raw</div>\n", true).unwrap();
        assert!(html.contains("<div class=\"x\">raw</div>"));
    }

    #[tokio::test]
    async fn missing_font_uses_fallback_stack() {
        let dir = TempDir::new().unwrap();
        let doc = builder(&dir)
            .build("# Title", Some(Path::new("/nonexistent/font.ttf")))
            .await
            .unwrap();
        assert!(!doc.html.contains("@font-face"));
        assert_eq!(doc.font_family, FALLBACK_FONT_STACK);
        assert!(doc.html.contains("<h1>Title</h1>"));
    }

    #[tokio::test]
    async fn existing_font_is_embedded_by_uri() {
        let dir = TempDir::new().unwrap();
        let font = dir.path().join("f.ttf");
        std::fs::write(&font, b"font").unwrap();

        let doc = builder(&dir).build("text", Some(&font)).await.unwrap();
        assert!(doc.html.contains("@font-face"));
        assert!(doc.html.contains("file://"));
        assert_eq!(doc.font_family, CUSTOM_FONT_FAMILY);
    }

    #[tokio::test]
    async fn unreachable_image_keeps_original_url() {
        let dir = TempDir::new().unwrap();
        let doc = builder(&dir)
            .build("![](https://unreachable.invalid/x.png)", None)
            .await
            .unwrap();
        assert!(doc.html.contains("src=\"https://unreachable.invalid/x.png\""));
    }
}

//! Syntax highlighting for fenced code blocks.
//!
//! syntect emits class-based HTML (`hl-` prefixed) and the matching
//! stylesheet is embedded once per document, so the browser does the
//! colouring. Highlighting never fails a render: an empty, unknown, or
//! unparseable language degrades to an escaped `<pre><code>` block.

use once_cell::sync::Lazy;
use syntect::{
    highlighting::ThemeSet,
    html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};
use tracing::{debug, warn};

/// Class prefix of highlighter spans.
pub const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

/// Theme whose colours become the embedded stylesheet.
pub const THEME_NAME: &str = "InspiredGitHub";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

static THEME_CSS: Lazy<String> = Lazy::new(|| {
    let themes = ThemeSet::load_defaults();
    let Some(theme) = themes.themes.get(THEME_NAME) else {
        warn!("Highlight theme '{}' missing, code will render unstyled", THEME_NAME);
        return String::new();
    };
    match css_for_theme_with_class_style(theme, CLASS_STYLE) {
        Ok(css) => css,
        Err(e) => {
            warn!("Failed to generate highlight CSS: {}", e);
            String::new()
        }
    }
});

/// Stylesheet matching the classes produced by [`highlight_code`].
pub fn theme_css() -> &'static str {
    THEME_CSS.as_str()
}

/// Render `code` as highlighted HTML for `language`.
///
/// Returns `<div class="highlight"><pre><code class="language-…">…</code></pre></div>`
/// when the language is known, and an escaped `<pre><code>…</code></pre>`
/// otherwise.
pub fn highlight_code(code: &str, language: Option<&str>) -> String {
    let Some(lang) = language.map(str::trim).filter(|l| !l.is_empty()) else {
        return plain_block(code);
    };
    let Some(syntax) = find_syntax(&SYNTAX_SET, lang) else {
        debug!("No syntax for language '{}', emitting plain block", lang);
        return plain_block(code);
    };

    match highlight_with(syntax, code) {
        Ok(body) => format!(
            "<div class=\"highlight\"><pre><code class=\"language-{}\">{}</code></pre></div>",
            escape_html(&lang.to_ascii_lowercase()),
            body
        ),
        Err(e) => {
            warn!("Highlighting '{}' failed, emitting plain block: {}", lang, e);
            plain_block(code)
        }
    }
}

fn highlight_with(syntax: &SyntaxReference, code: &str) -> Result<String, syntect::Error> {
    let mut source = code.to_string();
    if !source.ends_with('\n') {
        source.push('\n');
    }
    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, CLASS_STYLE);
    for line in LinesWithEndings::from(source.as_str()) {
        generator.parse_html_for_line_which_includes_newline(line)?;
    }
    Ok(generator.finalize())
}

fn find_syntax<'a>(set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lower = token.to_ascii_lowercase();
    set.find_syntax_by_token(&lower)
        .or_else(|| set.find_syntax_by_name(token))
        .or_else(|| set.find_syntax_by_extension(&lower))
}

fn plain_block(code: &str) -> String {
    format!("<pre><code>{}</code></pre>", escape_html(code))
}

/// Minimal HTML escaping for text and attribute values.
pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

//! Page template and browser flags.
//!
//! Everything that shapes how a document *looks* once it reaches the browser
//! lives here: the XHTML shell, the base stylesheet, the fallback font stack,
//! and the command-line flags handed to headless Chromium. The document
//! builder and capture engine import these constants; nothing else hardcodes
//! styling or flags.

/// Font family name bound to a user-supplied font file via `@font-face`.
pub const CUSTOM_FONT_FAMILY: &str = "CustomFont";

/// Family stack used when no usable font file is configured.
pub const FALLBACK_FONT_STACK: &str = r#"STSong-Light, "SimSun", serif"#;

/// Flags that switch off GPU and compositor paths. Only passed when
/// [`crate::RenderConfig::disable_gpu`] is set.
pub const GPU_FLAGS: &[&str] = &[
    "--disable-gpu",
    "--disable-gpu-sandbox",
    "--disable-software-rasterizer",
    "--disable-features=VizDisplayCompositor",
    "--disable-webgl",
    "--disable-gl-drawing-for-tests",
    "--disable-accelerated-2d-canvas",
    "--disable-accelerated-video-decode",
];

/// Flags passed on every launch.
pub const BROWSER_FLAGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--disable-web-security",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--ignore-certificate-errors",
    "--ignore-ssl-errors",
    "--ignore-certificate-errors-spki-list",
    "--allow-running-insecure-content",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-sync",
    "--disable-translate",
    "--hide-scrollbars",
    "--mute-audio",
    "--no-first-run",
    "--safebrowsing-disable-auto-update",
    "--disable-ipc-flooding-protection",
    "--disable-logging",
    "--disable-permissions-api",
    "--disable-notifications",
    "--allow-file-access-from-files",
];

/// User-Agent sent when downloading remote images.
pub const IMAGE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// `@font-face` rule binding `font_url` (a `file://` URI) to [`CUSTOM_FONT_FAMILY`].
pub fn font_face_css(font_url: &str) -> String {
    format!(
        "@font-face {{\n    font-family: '{}';\n    src: url(\"{}\");\n}}\n",
        CUSTOM_FONT_FAMILY, font_url
    )
}

/// CSS `font-family` value: a named family first, then the fallback stack.
fn family_declaration(font_family: &str) -> String {
    if font_family == FALLBACK_FONT_STACK {
        font_family.to_string()
    } else {
        format!("\"{}\", {}", font_family, FALLBACK_FONT_STACK)
    }
}

/// Base stylesheet for the rendered page.
pub fn page_css(font_family: &str) -> String {
    format!(
        r#"body {{
    background-color: #f8f9fa;
    font-family: {family};
    font-size: 16pt;
    word-wrap: break-word;
    overflow-wrap: break-word;
    line-height: 1.6;
    margin: 0;
    padding: 1.5em;
}}
p {{
    margin: 0.5em 0;
}}
h1, h2, h3, h4, h5, h6 {{
    font-family: {family};
    font-weight: bold;
    margin-top: 1em;
    margin-bottom: 0.5em;
}}
table {{
    border-collapse: collapse;
    width: 100%;
    margin: 1em 0;
}}
table, th, td {{
    border: 1px solid black;
}}
th, td {{
    padding: 8px;
    text-align: left;
}}
pre {{
    overflow: auto;
    margin: 1em 0;
}}
code {{
    font-family: "Courier New", monospace;
}}
:not(pre) > code {{
    background: #f4f4f4;
    padding: 3px;
}}
blockquote {{
    border-left: 4px solid #ccc;
    margin: 1em 0;
    padding-left: 1em;
    color: #666;
}}
ul, ol {{
    margin: 1em 0;
    padding-left: 2em;
}}
li {{
    margin: 0.5em 0;
}}
a {{
    color: #0066cc;
    text-decoration: underline;
}}
"#,
        family = family_declaration(font_family)
    )
}

/// Wrap a body fragment in the full XHTML document.
///
/// `font_face` is empty when no custom font is in use; `highlight_css` is the
/// stylesheet of the syntax highlighter.
pub fn wrap_document(font_face: &str, highlight_css: &str, font_family: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<meta http-equiv="Content-Type" content="text/html; charset=utf-8"/>
<style type="text/css">
{font_face}
{highlight_css}
{page_css}
</style>
</head>
<body>
{body}
</body>
</html>
"#,
        page_css = page_css(font_family),
    )
}

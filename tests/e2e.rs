//! End-to-end tests against a real headless Chromium.
//!
//! Gated behind the `E2E_ENABLED` environment variable and skipped when no
//! browser can be found (set `MARKDOWN2IMG_BROWSER` to point at one).
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use markdown2img::{
    render_markdown_to_base64, render_markdown_to_image_bytes, render_to_file, RenderConfig,
    RenderRequest,
};
use std::path::PathBuf;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target/e2e-output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test unless E2E_ENABLED is set and a browser is installed.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if !browser_locate::is_browser_available() {
            println!(
                "SKIP — no Chromium found; set {}",
                browser_locate::BROWSER_ENV_VAR
            );
            return;
        }
    }};
}

fn config_in(dir: &TempDir) -> RenderConfig {
    RenderConfig::builder()
        .work_dir(dir.path())
        .build()
        .expect("valid config")
}

const RICH_DOC: &str = r#"# Release notes

| Feature | Status |
|---------|--------|
| Tables  | ✅     |
| Tasks   | ✅     |

- [x] ship it
- [ ] celebrate

~~old~~ new, with a footnote[^1].

```rust
fn main() {
    println!("hello");
}
```

[^1]: Rendered by Chromium.
"#;

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_title_and_body() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let uri = render_markdown_to_base64(&RenderRequest::new("# Title\n\nBody text"), &config)
        .await
        .expect("render succeeds");
    assert!(uri.starts_with("base64://"));
    assert!(uri.len() > 100);
}

#[tokio::test]
async fn test_rich_document_is_cropped() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let png = render_markdown_to_image_bytes(&RenderRequest::new(RICH_DOC), &config)
        .await
        .expect("render succeeds");
    let img = image::load_from_memory(&png).unwrap();

    // 800 CSS px at 2x; the crop removes most of the 1600px-tall first viewport.
    assert_eq!(img.width(), 1600);
    assert!(img.height() < 1600 * 2, "height {} not cropped", img.height());
    std::fs::write(output_dir().join("rich.png"), &png).ok();
}

#[tokio::test]
async fn test_long_document_grows_viewport() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let md: String = (1..=150).map(|i| format!("Paragraph {i}\n\n")).collect();
    let png = render_markdown_to_image_bytes(&RenderRequest::new(md).with_zoom(1.0), &config)
        .await
        .expect("render succeeds");
    let img = image::load_from_memory(&png).unwrap();
    assert!(img.height() > 3000, "height {} too small for 150 paragraphs", img.height());
}

#[tokio::test]
async fn test_render_to_file_and_clean_work_dir() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let out = output_dir().join("notes.png");

    let written = render_to_file(&RenderRequest::new("## Notes\n\n1. one\n2. two"), &out, &config)
        .await
        .expect("render succeeds");
    assert_eq!(std::fs::metadata(&out).unwrap().len() as usize, written);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("temp_"))
        .collect();
    assert!(leftovers.is_empty());
}

//! Pipeline integration tests.
//!
//! A fake surface stands in for the browser: it paints a fixed-height block
//! of "content" into a viewport-sized PNG, so the height search, cropping and
//! scaling can be checked without Chromium or the network.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use markdown2img::{
    render_markdown_to_base64, render_markdown_to_image_bytes, render_sync, render_to_file,
    CaptureError, FetchError, ImageFetcher, PipelineError, RenderConfig, RenderProgressCallback,
    RenderRequest, RenderSurface, ScreenshotJob, SurfaceCapabilities,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

// ── Test doubles ─────────────────────────────────────────────────────────────

/// What the fake surface saw for one screenshot.
#[derive(Debug, Clone)]
struct SeenJob {
    width: u32,
    height: u32,
    device_scale_factor: Option<f64>,
    html: String,
    page_on_disk: bool,
}

/// Paints rows `CONTENT_TOP..content_height` (CSS px) dark on a light page.
struct PageSurface {
    content_height: u32,
    device_scale: bool,
    fail: bool,
    seen: Mutex<Vec<SeenJob>>,
}

const CONTENT_TOP: u32 = 10;

impl PageSurface {
    fn new(content_height: u32) -> Arc<Self> {
        Arc::new(Self {
            content_height,
            device_scale: true,
            fail: false,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn without_device_scale(content_height: u32) -> Arc<Self> {
        Arc::new(Self {
            content_height,
            device_scale: false,
            fail: false,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            content_height: 100,
            device_scale: true,
            fail: true,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn heights(&self) -> Vec<u32> {
        self.seen.lock().unwrap().iter().map(|j| j.height).collect()
    }

    fn last_job(&self) -> SeenJob {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl RenderSurface for PageSurface {
    fn name(&self) -> &str {
        "page-stub"
    }

    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities {
            device_scale_factor: self.device_scale,
        }
    }

    async fn screenshot(&self, job: &ScreenshotJob<'_>) -> Result<Option<PathBuf>, CaptureError> {
        self.seen.lock().unwrap().push(SeenJob {
            width: job.width,
            height: job.height,
            device_scale_factor: job.device_scale_factor,
            html: job.html.to_string(),
            page_on_disk: job.html_path.is_file(),
        });
        if self.fail {
            return Err(CaptureError::Service("stub refused the job".into()));
        }

        let scale = job.device_scale_factor.unwrap_or(1.0);
        let px = |v: u32| (v as f64 * scale).round() as u32;
        let (w, h) = (px(job.width), px(job.height));
        let (top, bottom) = (px(CONTENT_TOP), px(self.content_height).min(h));

        let mut img = RgbImage::from_pixel(w, h, Rgb([250, 250, 250]));
        for y in top..bottom {
            for x in 4.min(w)..w.saturating_sub(4) {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| CaptureError::Service(e.to_string()))?;
        std::fs::write(job.output, bytes).map_err(|source| CaptureError::Io {
            path: job.output.to_path_buf(),
            source,
        })?;
        Ok(Some(job.output.to_path_buf()))
    }
}

/// Serves a tiny body for every URL, or fails every request.
struct CountingFetcher {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingFetcher {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }
}

#[async_trait]
impl ImageFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(FetchError::Request {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        } else {
            Ok(b"image-bytes".to_vec())
        }
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl RenderProgressCallback for Recorder {
    fn on_render_start(&self, canvas_width: u32, seed_height: u32) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {canvas_width}x{seed_height}"));
    }
    fn on_capture_start(&self, attempt: u32, height: u32) {
        self.events
            .lock()
            .unwrap()
            .push(format!("capture {attempt} {height}"));
    }
    fn on_capture_complete(&self, attempt: u32, _height: u32, bottom_margin: Option<u32>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {attempt} {}", bottom_margin.is_some()));
    }
    fn on_render_complete(&self, png_len: usize) {
        self.events.lock().unwrap().push(format!("complete {png_len}"));
    }
}

fn config_for(dir: &TempDir, surface: Arc<PageSurface>, fetcher: Arc<CountingFetcher>) -> RenderConfig {
    RenderConfig::builder()
        .work_dir(dir.path())
        .surface(surface)
        .image_fetcher(fetcher)
        .build()
        .unwrap()
}

fn temp_leftovers(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| n.starts_with("temp_"))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn short_document_renders_in_one_capture() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::new(300);
    let config = config_for(&dir, surface.clone(), CountingFetcher::ok());

    let req = RenderRequest::new("# Title\n\nBody text");
    let png = render_markdown_to_image_bytes(&req, &config).await.unwrap();

    assert!(png.starts_with(PNG_MAGIC));
    assert_eq!(surface.heights(), vec![800]);

    let job = surface.last_job();
    assert_eq!(job.width, 800);
    assert_eq!(job.device_scale_factor, Some(2.0));
    assert!(job.page_on_disk);
    assert!(job.html.contains("<h1>Title</h1>"));

    // Content rows 20..600 at 2x, plus 32px padding below.
    let img = image::load_from_memory(&png).unwrap();
    assert_eq!(img.dimensions(), (1600, 632));
}

#[tokio::test]
async fn base64_form_has_prefix() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, PageSurface::new(300), CountingFetcher::ok());

    let uri = render_markdown_to_base64(&RenderRequest::new("# Title\n\nBody text"), &config)
        .await
        .unwrap();
    assert!(uri.starts_with("base64://"));
    assert!(uri.len() > "base64://".len());
}

#[tokio::test]
async fn tall_content_grows_viewport() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::new(1000);
    let config = config_for(&dir, surface.clone(), CountingFetcher::ok());

    render_markdown_to_image_bytes(&RenderRequest::new("# Long"), &config)
        .await
        .unwrap();
    assert_eq!(surface.heights(), vec![800, 1600]);
}

#[tokio::test]
async fn attempt_cap_stops_search() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::new(100_000);
    let config = RenderConfig::builder()
        .work_dir(dir.path())
        .surface(surface.clone())
        .image_fetcher(CountingFetcher::ok())
        .max_attempts(2)
        .build()
        .unwrap();

    let png = render_markdown_to_image_bytes(&RenderRequest::new("x").with_zoom(1.0), &config)
        .await
        .unwrap();
    assert_eq!(surface.heights(), vec![800, 1600]);
    let img = image::load_from_memory(&png).unwrap();
    assert_eq!(img.height(), 1600);
}

#[tokio::test]
async fn temp_files_removed_after_success_and_failure() {
    let dir = TempDir::new().unwrap();
    let ok = config_for(&dir, PageSurface::new(300), CountingFetcher::ok());
    render_markdown_to_image_bytes(&RenderRequest::new("# ok"), &ok)
        .await
        .unwrap();
    assert!(temp_leftovers(dir.path()).is_empty());

    let surface = PageSurface::failing();
    let failing = config_for(&dir, surface.clone(), CountingFetcher::ok());
    let err = render_markdown_to_image_bytes(&RenderRequest::new("# fail"), &failing)
        .await
        .unwrap_err();
    assert!(matches!(
        err.cause(),
        PipelineError::Capture(CaptureError::Service(_))
    ));
    assert!(surface.last_job().page_on_disk);
    assert!(temp_leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn unreachable_image_does_not_fail_render() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::new(300);
    let fetcher = CountingFetcher::unreachable();
    let config = config_for(&dir, surface.clone(), fetcher.clone());

    let md = "![logo](https://images.invalid/logo.png)";
    let png = render_markdown_to_image_bytes(&RenderRequest::new(md), &config)
        .await
        .unwrap();
    assert!(png.starts_with(PNG_MAGIC));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(surface
        .last_job()
        .html
        .contains("https://images.invalid/logo.png"));
}

#[tokio::test]
async fn remote_images_are_cached_once() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::new(300);
    let fetcher = CountingFetcher::ok();
    let config = config_for(&dir, surface.clone(), fetcher.clone());

    let md = "![a](https://cdn.example.com/a.png)";
    for _ in 0..2 {
        render_markdown_to_image_bytes(&RenderRequest::new(md), &config)
            .await
            .unwrap();
    }

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    let html = surface.last_job().html;
    assert!(html.contains("file://"));
    assert!(!html.contains("https://cdn.example.com/a.png"));

    let cached: Vec<_> = std::fs::read_dir(dir.path().join("image_cache"))
        .unwrap()
        .flatten()
        .collect();
    assert_eq!(cached.len(), 1);
    assert!(cached[0].file_name().to_string_lossy().ends_with(".png"));
}

#[tokio::test]
async fn missing_font_falls_back_to_default_stack() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::new(300);
    let config = config_for(&dir, surface.clone(), CountingFetcher::ok());

    let req = RenderRequest::new("中文 text").with_font("/nonexistent/font.ttf");
    render_markdown_to_image_bytes(&req, &config).await.unwrap();

    let html = surface.last_job().html;
    assert!(!html.contains("@font-face"));
    assert!(html.contains("STSong-Light"));
}

#[tokio::test]
async fn unknown_code_language_renders_plain() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::new(300);
    let config = config_for(&dir, surface.clone(), CountingFetcher::ok());

    let md = "```rust-nonexistent\nfn main() {}\n```";
    render_markdown_to_image_bytes(&RenderRequest::new(md), &config)
        .await
        .unwrap();
    assert!(surface.last_job().html.contains("fn main() {}"));
}

#[tokio::test]
async fn zoom_is_post_scaled_without_device_scale_support() {
    let dir = TempDir::new().unwrap();
    let surface = PageSurface::without_device_scale(300);
    let config = config_for(&dir, surface.clone(), CountingFetcher::ok());

    let png = render_markdown_to_image_bytes(&RenderRequest::new("# hi").with_width(400), &config)
        .await
        .unwrap();

    assert_eq!(surface.last_job().device_scale_factor, None);
    // Captured at 400 wide, content rows 10..300 cropped to 0..332, then doubled.
    let img = image::load_from_memory(&png).unwrap();
    assert_eq!(img.dimensions(), (800, 664));
}

#[tokio::test]
async fn progress_events_are_delivered_in_order() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = RenderConfig::builder()
        .work_dir(dir.path())
        .surface(PageSurface::new(1000))
        .image_fetcher(CountingFetcher::ok())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let png = render_markdown_to_image_bytes(&RenderRequest::new("# p"), &config)
        .await
        .unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start 800x800".to_string(),
            "capture 1 800".to_string(),
            "done 1 true".to_string(),
            "capture 2 1600".to_string(),
            "done 2 true".to_string(),
            format!("complete {}", png.len()),
        ]
    );
}

#[tokio::test]
async fn render_to_file_writes_png() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, PageSurface::new(300), CountingFetcher::ok());
    let out = dir.path().join("out/answer.png");

    let written = render_to_file(&RenderRequest::new("# file"), &out, &config)
        .await
        .unwrap();
    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(bytes.len(), written);
    assert!(bytes.starts_with(PNG_MAGIC));
}

#[test]
fn sync_wrapper_renders() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, PageSurface::new(300), CountingFetcher::ok());
    let png = render_sync(&RenderRequest::new("# sync"), &config).unwrap();
    assert!(png.starts_with(PNG_MAGIC));
}

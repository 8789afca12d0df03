//! Capture engine: turn the HTML page into a screenshot at a given viewport.
//!
//! The actual rendering is delegated to a [`RenderSurface`], an
//! out-of-process renderer behind a small trait:
//!
//! | Surface            | Backend                                   | Device scale |
//! |--------------------|-------------------------------------------|--------------|
//! | [`ChromeSurface`]  | headless Chromium `--screenshot` CLI      | yes          |
//! | [`ServiceSurface`] | HTTP render service (`POST /render`)      | no           |
//!
//! Surfaces differ in whether they can render at a device scale factor. The
//! difference is negotiated once per run into a [`ScalePlan`]: either the
//! surface renders at `zoom` directly, or the post-processor resamples the
//! final image by `zoom`.
//!
//! [`CaptureEngine`] wraps a surface with the per-run invariants: fixed
//! canvas width, a single output file that is truncated before each attempt,
//! a hard deadline per screenshot, and PNG decoding on the blocking pool.

use crate::config::RenderConfig;
use crate::error::{CaptureError, PipelineError};
use crate::pipeline::encode::decode_png;
use crate::template::{BROWSER_FLAGS, GPU_FLAGS};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a surface can do besides taking a plain screenshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    /// Renders at a device scale factor (HiDPI screenshots).
    pub device_scale_factor: bool,
}

/// One screenshot request handed to a surface.
#[derive(Debug, Clone)]
pub struct ScreenshotJob<'a> {
    /// The page on disk, for surfaces that load files.
    pub html_path: &'a Path,
    /// The page markup, for surfaces that take it inline.
    pub html: &'a str,
    /// Where the PNG must be written.
    pub output: &'a Path,
    pub width: u32,
    pub height: u32,
    /// Set only when the surface advertised support for it.
    pub device_scale_factor: Option<f64>,
}

/// An out-of-process renderer that can screenshot an HTML page.
///
/// Returns the path of the written PNG, or `None` when the renderer reported
/// success without producing anything.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> SurfaceCapabilities;

    async fn screenshot(&self, job: &ScreenshotJob<'_>) -> Result<Option<PathBuf>, CaptureError>;
}

// ── Scale negotiation ─────────────────────────────────────────────────────────

/// How the requested zoom is realised for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePlan {
    /// Passed to the surface; `None` renders at 1×.
    pub device_scale_factor: Option<f64>,
    /// Applied by the post-processor; `1.0` means no resampling.
    pub post_scale_factor: f64,
}

impl ScalePlan {
    pub fn negotiate(zoom: f64, caps: SurfaceCapabilities) -> Self {
        if zoom == 1.0 {
            Self {
                device_scale_factor: None,
                post_scale_factor: 1.0,
            }
        } else if caps.device_scale_factor {
            Self {
                device_scale_factor: Some(zoom),
                post_scale_factor: 1.0,
            }
        } else {
            Self {
                device_scale_factor: None,
                post_scale_factor: zoom,
            }
        }
    }
}

// ── Chromium CLI surface ──────────────────────────────────────────────────────

/// Headless Chromium driven through its `--screenshot` command line.
pub struct ChromeSurface {
    program: PathBuf,
    disable_gpu: bool,
}

impl ChromeSurface {
    pub fn new(program: impl Into<PathBuf>, disable_gpu: bool) -> Self {
        Self {
            program: program.into(),
            disable_gpu,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for one screenshot.
    pub fn args(&self, job: &ScreenshotJob<'_>) -> Result<Vec<String>, CaptureError> {
        let page_url = reqwest::Url::from_file_path(job.html_path).map_err(|_| CaptureError::Io {
            path: job.html_path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "page path must be absolute",
            ),
        })?;

        let mut args: Vec<String> = Vec::with_capacity(GPU_FLAGS.len() + BROWSER_FLAGS.len() + 5);
        args.push("--headless=new".to_string());
        if self.disable_gpu {
            args.extend(GPU_FLAGS.iter().map(|f| f.to_string()));
        }
        args.extend(BROWSER_FLAGS.iter().map(|f| f.to_string()));
        args.push(format!("--screenshot={}", job.output.display()));
        args.push(format!("--window-size={},{}", job.width, job.height));
        if let Some(dsf) = job.device_scale_factor {
            args.push(format!("--force-device-scale-factor={}", dsf));
        }
        args.push(page_url.to_string());
        Ok(args)
    }
}

#[async_trait]
impl RenderSurface for ChromeSurface {
    fn name(&self) -> &str {
        "chrome"
    }

    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities {
            device_scale_factor: true,
        }
    }

    async fn screenshot(&self, job: &ScreenshotJob<'_>) -> Result<Option<PathBuf>, CaptureError> {
        let args = self.args(job)?;
        debug!("Launching {} with {} args", self.program.display(), args.len());

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CaptureError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Exited {
                code: output.status.code(),
                stderr: tail(&stderr, 400),
            });
        }
        Ok(Some(job.output.to_path_buf()))
    }
}

// ── HTTP render service surface ───────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ServiceResponse {
    status: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// A wkhtmltoimage-style HTTP service: `POST <base>/render` with the page
/// inline, base64 PNG in the JSON answer.
pub struct ServiceSurface {
    client: reqwest::Client,
    base_url: String,
    quality: u8,
}

impl ServiceSurface {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            quality: 92,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/render", self.base_url)
    }

    /// Extract the PNG bytes from a service answer.
    fn decode_response(body: &str) -> Result<Vec<u8>, CaptureError> {
        let resp: ServiceResponse = serde_json::from_str(body).map_err(|e| {
            CaptureError::Service(format!(
                "unreadable response ({}): {}",
                e,
                body.chars().take(200).collect::<String>()
            ))
        })?;

        if resp.status != "success" {
            let msg = resp.message.unwrap_or_else(|| "unknown error".to_string());
            return Err(CaptureError::Service(msg));
        }
        let image = resp
            .image
            .ok_or_else(|| CaptureError::Service("response has no image field".into()))?;
        let payload = image
            .split_once("base64,")
            .map(|(_, data)| data)
            .unwrap_or(&image);
        STANDARD
            .decode(payload.trim())
            .map_err(|e| CaptureError::Service(format!("invalid base64 image: {}", e)))
    }
}

#[async_trait]
impl RenderSurface for ServiceSurface {
    fn name(&self) -> &str {
        "render-service"
    }

    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities::default()
    }

    async fn screenshot(&self, job: &ScreenshotJob<'_>) -> Result<Option<PathBuf>, CaptureError> {
        let body = serde_json::json!({
            "html": job.html,
            "width": job.width,
            "height": job.height,
            "format": "png",
            "quality": self.quality,
        });

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| CaptureError::Service(format!("request failed: {}", e)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CaptureError::Service(format!("reading response failed: {}", e)))?;
        if !status.is_success() {
            return Err(CaptureError::Service(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(400).collect::<String>()
            )));
        }

        let png = Self::decode_response(&text)?;
        tokio::fs::write(job.output, &png)
            .await
            .map_err(|source| CaptureError::Io {
                path: job.output.to_path_buf(),
                source,
            })?;
        Ok(Some(job.output.to_path_buf()))
    }
}

// ── Surface resolution ────────────────────────────────────────────────────────

/// Pick the surface for a run: an injected surface, else the render
/// service, else an explicit browser, else a discovered one.
pub fn resolve_surface(config: &RenderConfig) -> Result<Arc<dyn RenderSurface>, CaptureError> {
    if let Some(surface) = &config.surface {
        return Ok(Arc::clone(surface));
    }
    if let Some(url) = &config.render_service_url {
        info!("Using render service at {}", url);
        return Ok(Arc::new(ServiceSurface::new(url.clone())));
    }
    let program = match &config.browser_path {
        Some(p) => p.clone(),
        None => browser_locate::locate_browser()?,
    };
    info!("Using browser {}", program.display());
    Ok(Arc::new(ChromeSurface::new(program, config.disable_gpu)))
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Takes one screenshot at a given viewport height.
///
/// The seam the height resolver drives; tests substitute synthetic images.
#[async_trait]
pub trait Capture: Send + Sync {
    async fn capture(&self, height: u32) -> Result<DynamicImage, PipelineError>;
}

/// A surface bound to one run's page, output file, width and scale.
pub struct CaptureEngine {
    surface: Arc<dyn RenderSurface>,
    html_path: PathBuf,
    html: String,
    output: PathBuf,
    width: u32,
    device_scale_factor: Option<f64>,
    timeout: Duration,
}

impl CaptureEngine {
    pub fn new(
        surface: Arc<dyn RenderSurface>,
        html_path: PathBuf,
        html: String,
        output: PathBuf,
        width: u32,
        plan: ScalePlan,
        timeout: Duration,
    ) -> Self {
        Self {
            surface,
            html_path,
            html,
            output,
            width: width.max(1),
            device_scale_factor: plan.device_scale_factor,
            timeout,
        }
    }

    fn io_err(path: &Path, source: std::io::Error) -> PipelineError {
        PipelineError::Capture(CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl Capture for CaptureEngine {
    async fn capture(&self, height: u32) -> Result<DynamicImage, PipelineError> {
        // Truncate so a stale capture can never be mistaken for this one.
        tokio::fs::File::create(&self.output)
            .await
            .map_err(|e| Self::io_err(&self.output, e))?;

        let job = ScreenshotJob {
            html_path: &self.html_path,
            html: &self.html,
            output: &self.output,
            width: self.width,
            height,
            device_scale_factor: self.device_scale_factor,
        };

        let returned = match tokio::time::timeout(self.timeout, self.surface.screenshot(&job)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Surface '{}' timed out after {:?} at {}x{}",
                    self.surface.name(),
                    self.timeout,
                    self.width,
                    height
                );
                return Err(CaptureError::Timeout {
                    after: self.timeout,
                }
                .into());
            }
        };

        let path = returned.ok_or_else(|| CaptureError::NoOutputPath {
            surface: self.surface.name().to_string(),
        })?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => return Err(CaptureError::MissingOutput { path }.into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaptureError::MissingOutput { path }.into())
            }
            Err(e) => return Err(Self::io_err(&path, e)),
        };

        let img = tokio::task::spawn_blocking(move || decode_png(&bytes))
            .await
            .map_err(|e| PipelineError::Internal(format!("PNG decode task panicked: {}", e)))??;
        debug!(
            "Captured {}x{} viewport → {}x{} image",
            self.width,
            height,
            img.width(),
            img.height()
        );
        Ok(img)
    }
}

/// Last `max_chars` characters of `s`.
fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(max_chars)).collect::<String>().trim().to_string()
}

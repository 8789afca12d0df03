//! CLI binary for markdown2img.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `RenderConfig` / `RenderRequest` and writes the PNG.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use markdown2img::{
    clean_up, render_markdown_to_base64, render_markdown_to_image_bytes, render_to_file,
    ProgressCallback, RenderConfig, RenderConfigBuilder, RenderProgressCallback, RenderRequest,
};
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per capture attempt.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Building page…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self::with_bar(bar)
    }

    fn with_bar(bar: ProgressBar) -> Arc<Self> {
        Arc::new(Self { bar })
    }

    /// Stop the spinner when a render fails before `on_render_complete`.
    fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl RenderProgressCallback for CliProgressCallback {
    fn on_render_start(&self, canvas_width: u32, seed_height: u32) {
        self.bar.set_prefix("Rendering");
        self.bar
            .set_message(format!("{canvas_width}px wide, first guess {seed_height}px"));
    }

    fn on_capture_start(&self, attempt: u32, height: u32) {
        self.bar
            .set_message(format!("capture #{attempt} at {height}px"));
    }

    fn on_capture_complete(&self, attempt: u32, height: u32, bottom_margin: Option<u32>) {
        let margin = match bottom_margin {
            Some(m) => format!("{m}px free below content"),
            None => "blank page".to_string(),
        };
        self.bar.println(format!(
            "  {} capture #{:<2} {:>6}px  {}",
            green("✓"),
            attempt,
            height,
            dim(&margin)
        ));
    }

    fn on_render_complete(&self, png_len: usize) {
        self.bar.finish_and_clear();
        eprintln!("{} PNG ready ({} bytes)", green("✔"), bold(&png_len.to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render a file to PNG
  md2img README.md -o readme.png

  # From stdin, as a base64:// URI for a chat adapter
  cat answer.md | md2img - --base64

  # Narrow canvas, 3x zoom, custom CJK font
  md2img notes.md --width 600 --zoom 3 --font ~/fonts/NotoSerifSC.otf -o notes.png

  # Render through an HTTP render service instead of a local browser
  md2img notes.md --service-url http://localhost:32180 -o notes.png

  # Remove temp files left behind by crashed runs
  md2img --clean-up

ENVIRONMENT VARIABLES:
  MARKDOWN2IMG_FONT_PATH           Default font file
  MARKDOWN2IMG_DISABLE_GPU         Pass GPU-disabling flags to the browser (default true)
  MARKDOWN2IMG_DISABLE_LINKIFY     Do not turn bare URLs into links (default true)
  MARKDOWN2IMG_BROWSER             Chromium / Chrome executable
  MARKDOWN2IMG_RENDER_SERVICE_URL  HTTP render service base URL
"#;

/// Render Markdown to a single cropped PNG.
#[derive(Parser, Debug)]
#[command(
    name = "md2img",
    version,
    about = "Render Markdown to a single cropped PNG",
    long_about = "Render Markdown (GFM tables, task lists, footnotes, math, highlighted code) \
to one PNG using headless Chromium or an HTTP render service. The viewport grows until the \
whole document fits, then the image is cropped to its content.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file, or `-` for stdin.
    #[arg(required_unless_present = "clean_up")]
    input: Option<String>,

    /// Write the PNG to this file instead of stdout.
    #[arg(short, long, env = "MD2IMG_OUTPUT")]
    output: Option<PathBuf>,

    /// Canvas width in CSS pixels.
    #[arg(long, env = "MD2IMG_WIDTH", default_value_t = 800)]
    width: u32,

    /// Zoom factor (2.0 = retina-sharp).
    #[arg(long, env = "MD2IMG_ZOOM", default_value_t = 2.0)]
    zoom: f64,

    /// Font file embedded via @font-face.
    #[arg(long, env = "MARKDOWN2IMG_FONT_PATH")]
    font: Option<PathBuf>,

    /// Chromium / Chrome executable.
    #[arg(long, env = "MARKDOWN2IMG_BROWSER")]
    browser: Option<PathBuf>,

    /// Base URL of an HTTP render service.
    #[arg(long, env = "MARKDOWN2IMG_RENDER_SERVICE_URL")]
    service_url: Option<String>,

    /// Print a `base64://` URI to stdout instead of raw PNG bytes.
    #[arg(long, conflicts_with = "output")]
    base64: bool,

    /// Delete leftover temp files in the work directory and exit.
    #[arg(long)]
    clean_up: bool,

    /// Per-screenshot timeout in seconds.
    #[arg(long, env = "MD2IMG_CAPTURE_TIMEOUT", default_value_t = 60)]
    capture_timeout: u64,

    /// Disable progress spinner.
    #[arg(long, env = "MD2IMG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2IMG_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback a user needs, so library INFO
    // logs are suppressed while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.clean_up;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Clean-up mode ────────────────────────────────────────────────────
    if cli.clean_up {
        let config = build_config(&cli, None)?;
        let removed = clean_up(&config);
        if !cli.quiet {
            eprintln!("Removed {} temp file(s)", removed);
        }
        return Ok(());
    }

    let markdown = read_input(cli.input.as_deref().unwrap_or("-"))?;
    let request = RenderRequest::new(markdown)
        .with_width(cli.width)
        .with_zoom(cli.zoom);

    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = spinner
        .clone()
        .map(|cb| cb as Arc<dyn RenderProgressCallback>);

    let result = async {
        let config = build_config(&cli, progress_cb)?;
        write_output(&cli, &request, &config).await
    }
    .await;
    if result.is_err() {
        if let Some(ref cb) = spinner {
            cb.clear();
        }
    }
    result
}

/// Render and deliver the PNG the way the flags ask for.
async fn write_output(cli: &Cli, request: &RenderRequest, config: &RenderConfig) -> Result<()> {
    if let Some(ref output_path) = cli.output {
        let written = render_to_file(request, output_path, config)
            .await
            .context("Rendering failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} bytes  →  {}",
                green("✔"),
                written,
                bold(&output_path.display().to_string())
            );
        }
    } else if cli.base64 {
        let uri = render_markdown_to_base64(request, config)
            .await
            .context("Rendering failed")?;
        println!("{uri}");
    } else {
        let stdout = io::stdout();
        if stdout.is_terminal() {
            anyhow::bail!("Refusing to write PNG bytes to a terminal; use -o FILE or --base64");
        }
        let png = render_markdown_to_image_bytes(request, config)
            .await
            .context("Rendering failed")?;
        let mut handle = stdout.lock();
        handle
            .write_all(&png)
            .and_then(|_| handle.flush())
            .context("Failed to write to stdout")?;
    }
    Ok(())
}

/// Read Markdown from a file, or stdin for `-`.
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read Markdown from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {:?}", input))
    }
}

/// Map CLI args to `RenderConfig`, on top of the environment defaults.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RenderConfig> {
    let mut builder: RenderConfigBuilder =
        RenderConfigBuilder::from_env().capture_timeout_secs(cli.capture_timeout);

    if let Some(ref font) = cli.font {
        builder = builder.font_path(font);
    }
    if let Some(ref browser) = cli.browser {
        builder = builder.browser_path(browser);
    }
    if let Some(ref url) = cli.service_url {
        builder = builder.render_service_url(url);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_and_output_conflict() {
        let err = Cli::try_parse_from(["md2img", "a.md", "-o", "a.png", "--base64"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        let cli = Cli::try_parse_from(["md2img", "a.md", "--base64"]).unwrap();
        assert!(cli.base64 && cli.output.is_none());
    }

    #[test]
    fn clean_up_needs_no_input() {
        let cli = Cli::try_parse_from(["md2img", "--clean-up"]).unwrap();
        assert!(cli.clean_up && cli.input.is_none());
    }

    #[test]
    fn spinner_is_cleared_after_failure() {
        let cb = CliProgressCallback::with_bar(ProgressBar::hidden());
        cb.on_capture_start(1, 800);
        assert!(!cb.bar.is_finished());
        cb.clear();
        assert!(cb.bar.is_finished());
        // Idempotent once finished.
        cb.clear();
    }
}

//! Progress-callback trait for per-capture render events.
//!
//! Inject an [`Arc<dyn RenderProgressCallback>`] via
//! [`crate::config::RenderConfigBuilder::progress_callback`] to observe the
//! adaptive height search as it grows the viewport.
//!
//! # Example
//!
//! ```rust
//! use markdown2img::{RenderProgressCallback, RenderConfig};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct CountingCallback {
//!     captures: AtomicU32,
//! }
//!
//! impl RenderProgressCallback for CountingCallback {
//!     fn on_capture_complete(&self, attempt: u32, height: u32, _margin: Option<u32>) {
//!         self.captures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("capture {} at {}px", attempt, height);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { captures: AtomicU32::new(0) });
//!
//! let config = RenderConfig::builder()
//!     .progress_callback(counter as Arc<dyn RenderProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline while a render call runs.
///
/// All methods default to no-ops so callers only override what they care
/// about. Independent render calls may run concurrently and share one
/// callback, so implementations must be `Send + Sync`.
pub trait RenderProgressCallback: Send + Sync {
    /// Called once, after the request was validated.
    ///
    /// # Arguments
    /// * `canvas_width` — viewport width for the whole run
    /// * `seed_height`  — initial viewport height estimate
    fn on_render_start(&self, canvas_width: u32, seed_height: u32) {
        let _ = (canvas_width, seed_height);
    }

    /// Called just before the surface is asked for a screenshot.
    ///
    /// # Arguments
    /// * `attempt` — 1-indexed capture number
    /// * `height`  — viewport height of this capture
    fn on_capture_start(&self, attempt: u32, height: u32) {
        let _ = (attempt, height);
    }

    /// Called after a screenshot was decoded and analysed.
    ///
    /// # Arguments
    /// * `attempt`       — 1-indexed capture number
    /// * `height`        — viewport height of this capture
    /// * `bottom_margin` — empty pixels below the content, `None` for a blank image
    fn on_capture_complete(&self, attempt: u32, height: u32, bottom_margin: Option<u32>) {
        let _ = (attempt, height, bottom_margin);
    }

    /// Called once the final PNG is encoded.
    fn on_render_complete(&self, png_len: usize) {
        let _ = png_len;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RenderProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RenderConfig`].
pub type ProgressCallback = Arc<dyn RenderProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

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

        fn on_capture_complete(&self, attempt: u32, height: u32, bottom_margin: Option<u32>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("capture {attempt} {height} {bottom_margin:?}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_render_start(800, 800);
        cb.on_capture_start(1, 800);
        cb.on_capture_complete(1, 800, Some(10));
        cb.on_render_complete(4096);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_render_start(800, 1600);
        rec.on_capture_start(1, 1600);
        rec.on_capture_complete(1, 1600, None);
        rec.on_render_complete(10);

        let events = rec.events.lock().unwrap();
        assert_eq!(*events, vec!["start 800x1600", "capture 1 1600 None"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_capture_start(2, 3200);
    }
}

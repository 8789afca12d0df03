//! Pipeline stages for Markdown-to-image rendering.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own; the surfaces and the image fetcher sit behind traits
//! so tests never need a browser or the network.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ capture ◀──▶ height ──▶ postprocess ──▶ encode
//! (comrak,     (surface,    (grow      (crop, scale)   (PNG,
//!  cache)       deadline)    viewport)                  base64)
//! ```
//!
//! 1. [`document`] — Markdown → XHTML; uses [`highlight`] for fenced code and
//!    [`cache`] to swap remote images for local copies
//! 2. [`capture`]  — screenshot the page at a viewport size via a
//!    [`capture::RenderSurface`]
//! 3. [`height`]   — adaptive search for a viewport tall enough for the page
//! 4. [`postprocess`] — crop to content and apply the post-scale factor
//! 5. [`encode`]   — PNG encoding and the `base64://` form

pub mod cache;
pub mod capture;
pub mod document;
pub mod encode;
pub mod height;
pub mod highlight;
pub mod postprocess;

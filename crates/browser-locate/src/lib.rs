//! # browser-locate
//!
//! Find a Chromium-based browser that can take headless screenshots, so that
//! callers of `markdown2img` do not have to pass an explicit executable path.
//!
//! ## How it works
//!
//! On first call to [`locate_browser`]:
//!
//! 1. Checks `MARKDOWN2IMG_BROWSER` for an explicit executable path.
//! 2. Searches every directory in `PATH` for the platform's usual
//!    executable names (`chromium`, `google-chrome`, `chrome.exe`, …).
//! 3. Falls back to well-known install locations (system packages, the
//!    macOS `.app` bundles, per-user Windows installs, Playwright's cache).
//!
//! The result is memoised for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use browser_locate::{locate_browser, is_browser_available};
//!
//! if is_browser_available() {
//!     let chrome = locate_browser().expect("checked above");
//!     println!("using {}", chrome.display());
//! }
//! ```
//!
//! ## Platform support
//!
//! | OS      | Executable names                                        |
//! |---------|---------------------------------------------------------|
//! | Linux   | `chromium`, `chromium-browser`, `google-chrome(-stable)`, `microsoft-edge` |
//! | macOS   | `Google Chrome.app`, `Chromium.app`, `Microsoft Edge.app` |
//! | Windows | `chrome.exe`, `msedge.exe`                              |

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable holding an explicit browser executable path.
pub const BROWSER_ENV_VAR: &str = "MARKDOWN2IMG_BROWSER";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by browser discovery.
#[derive(Error, Debug)]
pub enum LocateError {
    /// The current OS has no known Chromium install layout.
    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    /// Nothing usable was found in any searched location.
    #[error(
        "No Chromium-based browser found ({searched} locations searched).\n\
Install Chromium or Google Chrome, or set {}=/path/to/chrome.",
        BROWSER_ENV_VAR
    )]
    NotFound { searched: usize },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Executable names searched for in `PATH`.
    executable_names: &'static [&'static str],
    /// Absolute install locations checked after `PATH`.
    install_paths: Vec<PathBuf>,
    /// Relative path of the executable inside a Playwright `chromium-*` dir.
    playwright_executable: &'static str,
}

fn detect_platform() -> Result<PlatformInfo, LocateError> {
    match std::env::consts::OS {
        "linux" => Ok(PlatformInfo {
            executable_names: &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
                "chrome",
                "microsoft-edge",
            ],
            install_paths: vec![
                PathBuf::from("/usr/bin/chromium"),
                PathBuf::from("/usr/bin/chromium-browser"),
                PathBuf::from("/usr/bin/google-chrome"),
                PathBuf::from("/snap/bin/chromium"),
                PathBuf::from("/opt/google/chrome/chrome"),
            ],
            playwright_executable: "chrome-linux/chrome",
        }),
        "macos" => Ok(PlatformInfo {
            executable_names: &["chromium", "google-chrome"],
            install_paths: vec![
                PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
                PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
                PathBuf::from("/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"),
            ],
            playwright_executable: "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
        }),
        "windows" => {
            let mut install_paths = Vec::new();
            if let Some(local) = dirs::data_local_dir() {
                install_paths.push(local.join(r"Google\Chrome\Application\chrome.exe"));
                install_paths.push(local.join(r"Chromium\Application\chrome.exe"));
            }
            install_paths.push(PathBuf::from(
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            ));
            install_paths.push(PathBuf::from(
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            ));
            install_paths.push(PathBuf::from(
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            ));
            Ok(PlatformInfo {
                executable_names: &["chrome.exe", "msedge.exe", "chromium.exe"],
                install_paths,
                playwright_executable: r"chrome-win\chrome.exe",
            })
        }
        os => Err(LocateError::UnsupportedPlatform { os: os.to_string() }),
    }
}

/// Playwright keeps its browsers under `<cache>/ms-playwright/chromium-<rev>/`.
fn playwright_root() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PLAYWRIGHT_BROWSERS_PATH") {
        return Some(PathBuf::from(p));
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .map(|base| base.join("ms-playwright"))
}

fn playwright_candidates(root: &Path, executable: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("chromium-"))
        .map(|e| e.path().join(executable))
        .collect();
    // Newest revision first.
    found.sort();
    found.reverse();
    found
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if [`locate_browser`] would succeed.
pub fn is_browser_available() -> bool {
    locate_browser().is_ok()
}

/// Search every directory of a `PATH`-style variable for the first of
/// `names` that exists as a regular file.
pub fn find_in_path(names: &[&str], path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var).find_map(|dir| {
        names
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// All absolute locations checked after `PATH`, in search order.
pub fn candidate_paths() -> Vec<PathBuf> {
    let Ok(info) = detect_platform() else {
        return Vec::new();
    };
    let mut paths = info.install_paths;
    if let Some(root) = playwright_root() {
        paths.extend(playwright_candidates(&root, info.playwright_executable));
    }
    paths
}

/// Locate a browser executable, memoising the first success.
///
/// # Thread safety
///
/// Safe to call from multiple threads; concurrent first calls may both
/// search, but they resolve the same path.
pub fn locate_browser() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = locate_with(
        std::env::var_os(BROWSER_ENV_VAR),
        std::env::var_os("PATH"),
    )?;

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Discovery with explicit inputs instead of process environment.
///
/// `override_path` takes precedence when it points at an existing file;
/// a stale override falls through to the regular search.
pub fn locate_with(
    override_path: Option<OsString>,
    path_var: Option<OsString>,
) -> Result<PathBuf, LocateError> {
    let mut searched = 0usize;

    // 1. Explicit override.
    if let Some(p) = override_path.filter(|p| !p.is_empty()) {
        searched += 1;
        let p = PathBuf::from(p);
        if p.is_file() {
            return Ok(p);
        }
    }

    let info = detect_platform()?;

    // 2. PATH lookup.
    if let Some(path_var) = path_var {
        searched += std::env::split_paths(&path_var).count();
        if let Some(found) = find_in_path(info.executable_names, &path_var) {
            return Ok(found);
        }
    }

    // 3. Well-known install locations.
    let candidates = candidate_paths();
    searched += candidates.len();
    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or(LocateError::NotFound { searched })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

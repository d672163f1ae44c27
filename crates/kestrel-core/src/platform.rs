//! Platform detection for kestrel
//!
//! Detects the current operating system for filtering plugins.

use kestrel_types::Os;

/// Detect the current operating system.
///
/// Returns `None` on targets no plugin can declare support for; the router
/// then treats every plugin as unsupported.
#[must_use]
pub fn detect() -> Option<Os> {
    #[cfg(target_os = "macos")]
    return Some(Os::Macos);

    #[cfg(target_os = "windows")]
    return Some(Os::Windows);

    #[cfg(target_os = "linux")]
    return Some(Os::Linux);

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    None
}

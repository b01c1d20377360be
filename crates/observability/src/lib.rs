//! Process-wide tracing setup shared by every binary embedding the workspace.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize JSON tracing for the process.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

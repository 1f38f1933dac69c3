/*
[INPUT]:  Public API exports for dexstream-watch crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod watcher;

// Re-export main types for convenience
pub use config::{SubscriptionConfig, WatchConfig};
pub use watcher::StreamWatcher;

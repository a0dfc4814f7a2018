/// Format keyboard callback handling
pub mod callbacks;
/// Download, upload and cleanup of a single request
pub mod delivery;
/// Command and message handlers
pub mod handlers;
/// Links waiting for a format choice
pub mod pending;
/// Resilient status message operations
pub mod resilient;
/// Download counters
pub mod stats;
/// Message texts and keyboards
pub mod views;

pub use pending::PendingLinks;
pub use stats::DownloadStats;

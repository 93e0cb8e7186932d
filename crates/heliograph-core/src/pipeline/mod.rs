pub mod config;
pub mod log;
mod orchestrator;
mod types;

pub use orchestrator::{run_scan, run_scan_reported};
pub use types::{ChannelImage, ChannelMetadata, ProgressReporter, ScanOutput, ScanStage};

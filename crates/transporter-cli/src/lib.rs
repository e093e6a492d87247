pub mod config;
pub mod pipeline;
pub mod progress;

pub use config::{Args, RunConfig};
pub use pipeline::{UploadContext, UploadStage, UploadSummary, run_upload};
pub use progress::{ProgressReporter, SpeedAndEta, format_bytes, format_speed_and_eta};

pub mod engine;
pub mod logging;
pub mod progress;

pub use engine::{ChunkTransferEngine, DEFAULT_CONCURRENCY, PayloadSource};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use progress::TransferProgress;

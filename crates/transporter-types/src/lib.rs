pub mod api;
pub mod error;
pub mod models;

pub use error::{UploadError, UploadResult, ValidationStage};
pub use models::{
    AppleId, BundleDescriptor, FileStats, MetadataArtifact, Operation, Reservation,
    SoftwareIdentity, UploadSession, METADATA_FILE_NAME,
};

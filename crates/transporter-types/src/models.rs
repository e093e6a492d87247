use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Logical name of the generated metadata document inside a package.
pub const METADATA_FILE_NAME: &str = "metadata.xml";

/// Session credentials returned by `authenticateForSession`.
///
/// Lives for exactly one upload run and is never renewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub session_id: String,
    pub shared_secret: String,
}

/// Identity and version read from the bundle's embedded Info.plist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    pub bundle_id: String,
    pub bundle_version: String,
    pub bundle_short_version: String,
}

/// Opaque application identifier. The service hands these out as numbers but
/// older records come back as strings, so both are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppleId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for AppleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{}", id),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// Target application record resolved by the software lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareIdentity {
    pub apple_id: AppleId,
    pub app_name: String,
    pub icon_url: Option<String>,
}

/// Local facts about the binary payload needed by metadata and completion calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub file_name: String,
    pub size: u64,
    /// Last modification time in whole milliseconds since the Unix epoch.
    pub modified_ms: i64,
}

/// The generated `metadata.xml` document in every form the protocol needs.
///
/// Built once per run; every validation and reservation call references the
/// same checksum, so it must never be regenerated mid-run.
#[derive(Debug, Clone)]
pub struct MetadataArtifact {
    pub buffer: Bytes,
    /// Hex MD5 of `buffer`.
    pub checksum: String,
    /// `buffer`, gzipped then base64 encoded.
    pub compressed_base64: String,
    pub size: u64,
}

/// One contiguous byte range of a reservation's file and where to send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub uri: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub offset: u64,
    pub length: u64,
}

/// Server-issued transfer plan for one logical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub file: String,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Reservation {
    /// Sum of all operation lengths, i.e. the bytes this reservation moves.
    pub fn total_length(&self) -> u64 {
        self.operations.iter().map(|op| op.length).sum()
    }
}

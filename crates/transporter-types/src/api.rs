use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AppleId, Reservation};

// -- Envelope --

/// JSON-RPC 2.0 request body. Serialized once so the exact bytes can be signed.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub id: &'a str,
    pub params: P,
}

impl<'a, P> RpcRequest<'a, P> {
    pub fn new(method: &'a str, id: &'a str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            id,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse<R> {
    pub result: R,
}

/// `Success` / `ErrorMessage` pair most producer results carry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl RemoteStatus {
    /// Local message with the remote diagnostic appended on its own line.
    pub fn failure_message(&self, message: &str) -> String {
        describe_failure(message, self.error_message.as_deref())
    }
}

pub fn describe_failure(message: &str, remote: Option<&str>) -> String {
    match remote {
        Some(detail) if !detail.is_empty() => format!("{}\n{}", message, detail),
        _ => message.to_string(),
    }
}

// -- Client identity --

pub const TRANSPORTER_APPLICATION: &str = "iTMSTransporter";
pub const TRANSPORTER_VERSION: &str = "2.0.0";
pub const TRANSPORTER_MODE: &str = "upload";
pub const TRANSPORT_HTTP: &str = "HTTP";

/// Client identity sent on every RPC and every chunk upload.
pub const CLIENT_USER_AGENT: &str = "iTMSTransporter/2.0.0";

/// Fields every producer call repeats.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo<'a> {
    #[serde(rename = "Application")]
    pub application: &'static str,
    #[serde(rename = "BaseVersion")]
    pub base_version: &'static str,
    #[serde(rename = "iTMSTransporterMode")]
    pub mode: &'static str,
    #[serde(rename = "Username")]
    pub username: &'a str,
    #[serde(rename = "Version")]
    pub version: &'static str,
}

impl<'a> ClientInfo<'a> {
    pub fn upload(username: &'a str) -> Self {
        Self {
            application: TRANSPORTER_APPLICATION,
            base_version: TRANSPORTER_VERSION,
            mode: TRANSPORTER_MODE,
            username,
            version: TRANSPORTER_VERSION,
        }
    }
}

// -- Auth --

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticateParams<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticateResult {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub shared_secret: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

// -- Lookup --

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LookupParams<'a> {
    pub application: &'static str,
    pub application_bundle_id: &'static str,
    pub bundle_id: &'a str,
    pub version: &'static str,
}

impl<'a> LookupParams<'a> {
    pub fn for_bundle(bundle_id: &'a str) -> Self {
        Self {
            application: "altool",
            application_bundle_id: "com.apple.itunes.altool",
            bundle_id,
            version: "4.0.1 (1182)",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SoftwareAttributes {
    #[serde(rename = "AppleID", default)]
    pub apple_id: Option<AppleId>,
    #[serde(rename = "Application", default)]
    pub application: String,
    #[serde(rename = "IconURL", default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupResult {
    #[serde(flatten)]
    pub status: RemoteStatus,
    #[serde(rename = "Attributes", default)]
    pub attributes: Vec<SoftwareAttributes>,
}

// -- Validation --

#[derive(Debug, Clone, Serialize)]
pub struct MetadataInfo<'a> {
    pub app_platform: &'static str,
    pub apple_id: &'a AppleId,
    pub asset_types: [&'static str; 1],
    pub bundle_identifier: &'a str,
    pub bundle_short_version_string: &'a str,
    pub bundle_version: &'a str,
    pub device_id: &'static str,
    #[serde(rename = "packageVersion")]
    pub package_version: &'static str,
    pub primary_bundle_identifier: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidateMetadataParams<'a> {
    #[serde(flatten)]
    pub client: ClientInfo<'a>,
    pub files: [&'a str; 2],
    pub metadata_checksum: &'a str,
    pub metadata_compressed: &'a str,
    pub metadata_info: MetadataInfo<'a>,
    pub package_name: &'a str,
    pub package_size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidateAssetsParams<'a> {
    #[serde(flatten)]
    pub metadata: ValidateMetadataParams<'a>,
    pub asset_descriptions_compressed: Vec<String>,
    pub streaming_info_list: Vec<Value>,
    pub transport: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ValidateAssetsResult {
    #[serde(flatten)]
    pub status: RemoteStatus,
    #[serde(rename = "NewPackageName", default)]
    pub new_package_name: Option<String>,
}

/// Params shared by `clientChecksumCompleted` and anything else that only
/// names the package.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageParams<'a> {
    #[serde(flatten)]
    pub client: ClientInfo<'a>,
    pub new_package_name: &'a str,
}

// -- Reservations --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescription<'a> {
    pub checksum: &'a str,
    pub checksum_algorithm: &'static str,
    pub content_type: &'static str,
    pub file_name: &'a str,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uti: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct CreateReservationParams<'a> {
    #[serde(flatten)]
    pub package: PackageParams<'a>,
    #[serde(rename = "fileDescriptions")]
    pub file_descriptions: Vec<FileDescription<'a>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationResult {
    #[serde(flatten)]
    pub status: RemoteStatus,
    #[serde(rename = "Reservations", default)]
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Serialize)]
pub struct CommitReservationParams<'a> {
    #[serde(flatten)]
    pub package: PackageParams<'a>,
    pub reservations: [&'a str; 1],
}

// -- Completion --

#[derive(Debug, Serialize)]
pub struct ClientChecksumInfo<'a> {
    #[serde(rename = "CalculatedChecksum")]
    pub calculated_checksum: &'a str,
    #[serde(rename = "CalculationTime")]
    pub calculation_time: u64,
    #[serde(rename = "FileLastModified")]
    pub file_last_modified: i64,
    #[serde(rename = "Filename")]
    pub filename: &'a str,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadDoneParams<'a> {
    #[serde(flatten)]
    pub package: PackageParams<'a>,
    pub file_size_info: BTreeMap<&'a str, u64>,
    pub client_checksum_info: Vec<ClientChecksumInfo<'a>>,
    pub statistics_array: Vec<Value>,
    pub streaming_info_list: Vec<Value>,
    pub package_path_without_base: Option<String>,
    pub transport: &'static str,
    pub transfer_time: u64,
    pub number_bytes_transferred: u64,
}

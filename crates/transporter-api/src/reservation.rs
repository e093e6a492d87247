use serde::de::DeserializeOwned;
use tracing::{debug, info};

use transporter_types::api::{
    ClientInfo, CreateReservationParams, CreateReservationResult, FileDescription, LookupParams,
    LookupResult, MetadataInfo, PackageParams, RemoteStatus, TRANSPORT_HTTP, ValidateAssetsParams,
    ValidateAssetsResult, ValidateMetadataParams,
};
use transporter_types::{
    AppleId, BundleDescriptor, FileStats, METADATA_FILE_NAME, MetadataArtifact, Reservation,
    SoftwareIdentity, UploadError, UploadResult, UploadSession, ValidationStage,
};

use crate::client::{Endpoint, ServiceClient};

/// Package name used until asset validation assigns one.
pub const INITIAL_PACKAGE_NAME: &str = "app.itmsp";

/// Everything the validation and reservation calls describe about the upload.
#[derive(Debug, Clone, Copy)]
pub struct PackageSubmission<'a> {
    pub bundle: &'a BundleDescriptor,
    pub apple_id: &'a AppleId,
    pub metadata: &'a MetadataArtifact,
    pub file: &'a FileStats,
    /// Hex MD5 of the whole binary.
    pub file_checksum: &'a str,
}

impl PackageSubmission<'_> {
    pub fn package_size(&self) -> u64 {
        self.file.size + self.metadata.size
    }
}

/// The ordered, signed pre-transfer calls. Each must succeed before the next
/// one is made; nothing here retries.
#[derive(Clone, Copy)]
pub struct ReservationProtocol<'a> {
    client: &'a ServiceClient,
    session: &'a UploadSession,
    username: &'a str,
}

impl<'a> ReservationProtocol<'a> {
    pub fn new(client: &'a ServiceClient, session: &'a UploadSession, username: &'a str) -> Self {
        Self {
            client,
            session,
            username,
        }
    }

    /// Resolve the application record for `bundle_id`. The first match wins.
    pub async fn lookup(&self, bundle_id: &str) -> UploadResult<SoftwareIdentity> {
        let result: LookupResult = self
            .client
            .call(
                Some(self.session),
                Endpoint::Software,
                "lookupSoftwareForBundleId",
                &LookupParams::for_bundle(bundle_id),
            )
            .await?;

        let failure = result
            .status
            .failure_message("Failed to lookup Apple ID for bundle!");
        if !result.status.success {
            return Err(UploadError::Lookup(failure));
        }
        // A match without an Apple ID is as good as no match.
        let Some((first, apple_id)) = result
            .attributes
            .into_iter()
            .next()
            .and_then(|mut first| first.apple_id.take().map(|id| (first, id)))
        else {
            return Err(UploadError::Lookup(failure));
        };

        info!(
            "Identified application as \"{}\" ({})",
            first.application, apple_id
        );
        Ok(SoftwareIdentity {
            apple_id,
            app_name: first.application,
            icon_url: first.icon_url,
        })
    }

    pub async fn validate_metadata(
        &self,
        submission: &PackageSubmission<'_>,
        package_name: &str,
    ) -> UploadResult<()> {
        let params = self.metadata_params(submission, package_name);
        let status: RemoteStatus = self.producer("validateMetadata", &params).await?;
        require_success(&status, || {
            UploadError::validation(
                ValidationStage::Metadata,
                status.failure_message("Metadata validation failed!"),
            )
        })
    }

    /// Validate assets and adopt the package name the service hands back.
    /// A reply without a name keeps the current one.
    pub async fn validate_assets(
        &self,
        submission: &PackageSubmission<'_>,
        package_name: &mut String,
    ) -> UploadResult<()> {
        let result: ValidateAssetsResult = {
            let params = ValidateAssetsParams {
                metadata: self.metadata_params(submission, package_name.as_str()),
                asset_descriptions_compressed: Vec::new(),
                streaming_info_list: Vec::new(),
                transport: TRANSPORT_HTTP,
            };
            self.producer("validateAssets", &params).await?
        };
        require_success(&result.status, || {
            UploadError::validation(
                ValidationStage::Assets,
                result.status.failure_message("Asset validation failed!"),
            )
        })?;

        if let Some(name) = result.new_package_name.filter(|n| !n.is_empty()) {
            debug!(old = %package_name, new = %name, "package renamed");
            *package_name = name;
        }
        Ok(())
    }

    pub async fn client_checksum_completed(&self, package_name: &str) -> UploadResult<()> {
        let params = PackageParams {
            client: ClientInfo::upload(self.username),
            new_package_name: package_name,
        };
        let status: RemoteStatus = self.producer("clientChecksumCompleted", &params).await?;
        require_success(&status, || {
            UploadError::validation(
                ValidationStage::ClientChecksum,
                status.failure_message("Client checksum failed!"),
            )
        })
    }

    /// Ask for transfer plans covering the metadata document and the binary.
    pub async fn create_reservation(
        &self,
        submission: &PackageSubmission<'_>,
        package_name: &str,
    ) -> UploadResult<Vec<Reservation>> {
        let params = CreateReservationParams {
            package: PackageParams {
                client: ClientInfo::upload(self.username),
                new_package_name: package_name,
            },
            file_descriptions: file_descriptions(submission).to_vec(),
        };
        let result: CreateReservationResult = self.producer("createReservation", &params).await?;
        require_success(&result.status, || {
            UploadError::Reservation(result.status.failure_message("Create reservation failed!"))
        })?;

        debug!(count = result.reservations.len(), "reservations created");
        Ok(result.reservations)
    }

    fn metadata_params<'p>(
        &self,
        submission: &PackageSubmission<'p>,
        package_name: &'p str,
    ) -> ValidateMetadataParams<'p>
    where
        'a: 'p,
    {
        ValidateMetadataParams {
            client: ClientInfo::upload(self.username),
            files: [&submission.file.file_name, METADATA_FILE_NAME],
            metadata_checksum: &submission.metadata.checksum,
            metadata_compressed: &submission.metadata.compressed_base64,
            metadata_info: MetadataInfo {
                app_platform: "ios",
                apple_id: submission.apple_id,
                asset_types: ["bundle"],
                bundle_identifier: &submission.bundle.bundle_id,
                bundle_short_version_string: &submission.bundle.bundle_short_version,
                bundle_version: &submission.bundle.bundle_version,
                device_id: "",
                package_version: "software5.4",
                primary_bundle_identifier: "",
            },
            package_name,
            package_size: submission.package_size(),
        }
    }

    async fn producer<P, R>(&self, method: &str, params: &P) -> UploadResult<R>
    where
        P: serde::Serialize,
        R: DeserializeOwned,
    {
        self.client
            .call(Some(self.session), Endpoint::Producer, method, params)
            .await
    }
}

/// Metadata first, then the binary.
pub fn file_descriptions<'p>(submission: &PackageSubmission<'p>) -> [FileDescription<'p>; 2] {
    [
        FileDescription {
            checksum: &submission.metadata.checksum,
            checksum_algorithm: "MD5",
            content_type: "application/xml",
            file_name: METADATA_FILE_NAME,
            file_size: submission.metadata.size,
            uti: None,
        },
        FileDescription {
            checksum: submission.file_checksum,
            checksum_algorithm: "MD5",
            content_type: "application/octet-stream",
            file_name: &submission.file.file_name,
            file_size: submission.file.size,
            uti: Some("com.apple.ipa"),
        },
    ]
}

pub(crate) fn require_success<F>(status: &RemoteStatus, err: F) -> UploadResult<()>
where
    F: FnOnce() -> UploadError,
{
    if status.success { Ok(()) } else { Err(err()) }
}

use std::collections::BTreeMap;

use tracing::{debug, info};

use transporter_types::api::{
    ClientChecksumInfo, ClientInfo, CommitReservationParams, PackageParams, RemoteStatus,
    TRANSPORT_HTTP, UploadDoneParams,
};
use transporter_types::{
    FileStats, METADATA_FILE_NAME, Reservation, UploadError, UploadResult, UploadSession,
};

use crate::client::{Endpoint, ServiceClient};
use crate::reservation::require_success;

/// Aggregate figures reported by `uploadDoneWithArguments`.
#[derive(Debug, Clone, Copy)]
pub struct CompletionReport<'a> {
    pub file: &'a FileStats,
    pub file_checksum: &'a str,
    /// How long hashing the binary took.
    pub checksum_time_ms: u64,
    pub metadata_size: u64,
    pub transfer_time_ms: u64,
    pub bytes_transferred: u64,
}

#[derive(Clone, Copy)]
pub struct CommitFinalizer<'a> {
    client: &'a ServiceClient,
    session: &'a UploadSession,
    username: &'a str,
}

impl<'a> CommitFinalizer<'a> {
    pub fn new(client: &'a ServiceClient, session: &'a UploadSession, username: &'a str) -> Self {
        Self {
            client,
            session,
            username,
        }
    }

    /// Make one reservation durable. Only call once all its operations succeeded.
    pub async fn commit(&self, package_name: &str, reservation: &Reservation) -> UploadResult<()> {
        let params = CommitReservationParams {
            package: self.package(package_name),
            reservations: [&reservation.id],
        };
        let status: RemoteStatus = self
            .client
            .call(Some(self.session), Endpoint::Producer, "commitReservation", &params)
            .await?;
        require_success(&status, || {
            UploadError::Commit(status.failure_message("Commit reservation failed!"))
        })?;

        debug!(reservation = %reservation.id, file = %reservation.file, "reservation committed");
        Ok(())
    }

    /// Signal that every reservation has been committed.
    pub async fn upload_done(
        &self,
        package_name: &str,
        report: &CompletionReport<'_>,
    ) -> UploadResult<()> {
        let mut file_size_info = BTreeMap::new();
        file_size_info.insert(report.file.file_name.as_str(), report.file.size);
        file_size_info.insert(METADATA_FILE_NAME, report.metadata_size);

        let params = UploadDoneParams {
            package: self.package(package_name),
            file_size_info,
            client_checksum_info: vec![ClientChecksumInfo {
                calculated_checksum: report.file_checksum,
                calculation_time: report.checksum_time_ms,
                file_last_modified: report.file.modified_ms,
                filename: &report.file.file_name,
                file_size: report.file.size,
            }],
            statistics_array: Vec::new(),
            streaming_info_list: Vec::new(),
            package_path_without_base: None,
            transport: TRANSPORT_HTTP,
            transfer_time: report.transfer_time_ms,
            number_bytes_transferred: report.bytes_transferred,
        };
        let status: RemoteStatus = self
            .client
            .call(Some(self.session), Endpoint::Producer, "uploadDoneWithArguments", &params)
            .await?;
        require_success(&status, || {
            UploadError::Completion(status.failure_message("Upload completion failed!"))
        })?;

        info!(
            bytes = report.bytes_transferred,
            transfer_ms = report.transfer_time_ms,
            "upload completed"
        );
        Ok(())
    }

    fn package<'p>(&self, package_name: &'p str) -> PackageParams<'p>
    where
        'a: 'p,
    {
        PackageParams {
            client: ClientInfo::upload(self.username),
            new_package_name: package_name,
        }
    }
}

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tracing::{debug, info};

use transporter_api::{
    CommitFinalizer, CompletionReport, INITIAL_PACKAGE_NAME, PackageSubmission,
    ReservationProtocol, ServiceClient, authenticate,
};
use transporter_package::{
    METADATA_TEMPLATE, PackageFile, assemble_metadata, download_temp_file,
    extract_bundle_descriptor, is_remote_source,
};
use transporter_transfer::{
    ChunkTransferEngine, PayloadSource, TracingLogger, TransferLogger, TransferProgress,
};
use transporter_types::{
    BundleDescriptor, MetadataArtifact, Reservation, SoftwareIdentity, UploadError, UploadResult,
    UploadSession,
};

use crate::config::RunConfig;
use crate::progress::ProgressReporter;

/// Where an upload run currently is. Stages only ever advance; the loop in
/// [`UploadContext::run`] stops at `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Authenticating,
    LookingUp,
    ValidatingMetadata,
    ValidatingAssets,
    ChecksumAck,
    Reserving,
    Transferring,
    Committing,
    Finalizing,
    Done,
    Failed,
}

impl UploadStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authenticating => "authenticating",
            Self::LookingUp => "looking_up",
            Self::ValidatingMetadata => "validating_metadata",
            Self::ValidatingAssets => "validating_assets",
            Self::ChecksumAck => "checksum_ack",
            Self::Reserving => "reserving",
            Self::Transferring => "transferring",
            Self::Committing => "committing",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a finished run reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub package_name: String,
    pub reservations: usize,
    pub bytes_sent: u64,
    pub transfer_time_ms: u64,
}

/// Local facts gathered before any remote call.
struct PreparedPackage {
    file: PackageFile,
    bundle: BundleDescriptor,
    checksum: String,
    checksum_time_ms: u64,
}

/// Run-scoped state threaded through every stage.
pub struct UploadContext {
    config: RunConfig,
    service: ServiceClient,
    engine: ChunkTransferEngine,
    package: PreparedPackage,
    stage: UploadStage,

    session: Option<UploadSession>,
    identity: Option<SoftwareIdentity>,
    metadata: Option<MetadataArtifact>,
    package_name: String,
    reservations: Vec<Reservation>,
    cursor: usize,

    source: Option<Arc<PayloadSource>>,
    reporter: Option<ProgressReporter>,
    transfer_started: Option<Instant>,
    transfer_time_ms: u64,
    bytes_sent: u64,
}

impl UploadContext {
    /// Inspect and hash the package. Nothing remote happens here.
    pub async fn prepare(
        config: RunConfig,
        http: Client,
        file: PackageFile,
        logger: Arc<dyn TransferLogger>,
    ) -> UploadResult<Self> {
        let bundle = extract_bundle_descriptor(&file).await.map_err(|e| {
            UploadError::Archive(format!(
                "Failed to extract Bundle ID and version, are you supplying a valid IPA-file? ({})",
                e
            ))
        })?;
        info!(
            "Found bundle ID \"{}\", version {} ({})",
            bundle.bundle_id, bundle.bundle_version, bundle.bundle_short_version
        );

        let (checksum, checksum_time_ms) = file.md5().await?;
        debug!(md5 = %checksum, ms = checksum_time_ms, "package hashed");

        let engine = ChunkTransferEngine::new(
            http.clone(),
            config.concurrency,
            Arc::new(TransferProgress::new()),
            logger,
        );
        let service = ServiceClient::new(http, config.services.clone());

        Ok(Self {
            config,
            service,
            engine,
            package: PreparedPackage {
                file,
                bundle,
                checksum,
                checksum_time_ms,
            },
            stage: UploadStage::Authenticating,
            session: None,
            identity: None,
            metadata: None,
            package_name: INITIAL_PACKAGE_NAME.to_string(),
            reservations: Vec::new(),
            cursor: 0,
            source: None,
            reporter: None,
            transfer_started: None,
            transfer_time_ms: 0,
            bytes_sent: 0,
        })
    }

    pub fn stage(&self) -> UploadStage {
        self.stage
    }

    /// Drive the stages in order until the upload is done or one fails.
    pub async fn run(mut self) -> UploadResult<UploadSummary> {
        while !self.stage.is_terminal() {
            debug!(stage = %self.stage, "entering stage");
            match self.step().await {
                Ok(next) => self.stage = next,
                Err(err) => {
                    debug!(stage = %self.stage, error = %err, "upload stage failed");
                    self.stage = UploadStage::Failed;
                    self.reporter = None;
                    return Err(err);
                }
            }
        }

        Ok(UploadSummary {
            package_name: self.package_name,
            reservations: self.reservations.len(),
            bytes_sent: self.bytes_sent,
            transfer_time_ms: self.transfer_time_ms,
        })
    }

    async fn step(&mut self) -> UploadResult<UploadStage> {
        use UploadStage::*;

        match self.stage {
            Authenticating => {
                let session =
                    authenticate(&self.service, &self.config.username, &self.config.password)
                        .await?;
                self.session = Some(session);
                Ok(LookingUp)
            }
            LookingUp => {
                let identity = self
                    .protocol()?
                    .lookup(&self.package.bundle.bundle_id)
                    .await?;
                let metadata = assemble_metadata(
                    METADATA_TEMPLATE,
                    &self.package.bundle,
                    self.package.file.stats(),
                    &self.package.checksum,
                    &identity.apple_id,
                )?;
                debug!(size = metadata.size, md5 = %metadata.checksum, "metadata generated");
                self.identity = Some(identity);
                self.metadata = Some(metadata);
                Ok(ValidatingMetadata)
            }
            ValidatingMetadata => {
                self.protocol()?
                    .validate_metadata(&self.submission()?, &self.package_name)
                    .await?;
                Ok(ValidatingAssets)
            }
            ValidatingAssets => {
                let mut name = self.package_name.clone();
                self.protocol()?
                    .validate_assets(&self.submission()?, &mut name)
                    .await?;
                self.package_name = name;
                Ok(ChecksumAck)
            }
            ChecksumAck => {
                self.protocol()?
                    .client_checksum_completed(&self.package_name)
                    .await?;
                Ok(Reserving)
            }
            Reserving => {
                let reservations = self
                    .protocol()?
                    .create_reservation(&self.submission()?, &self.package_name)
                    .await?;
                info!("Created {} reservations", reservations.len());
                self.reservations = reservations;
                Ok(if self.reservations.is_empty() {
                    Finalizing
                } else {
                    Transferring
                })
            }
            Transferring => {
                let source = self.begin_transfer()?;
                let reservation = &self.reservations[self.cursor];
                let sent = self.engine.transfer(reservation, &source).await?;
                self.bytes_sent += sent;
                Ok(Committing)
            }
            Committing => {
                let reservation = &self.reservations[self.cursor];
                self.finalizer()?
                    .commit(&self.package_name, reservation)
                    .await?;
                self.cursor += 1;
                Ok(if self.cursor < self.reservations.len() {
                    Transferring
                } else {
                    Finalizing
                })
            }
            Finalizing => {
                self.reporter = None;
                self.transfer_time_ms = self
                    .transfer_started
                    .map(|t| t.elapsed().as_millis() as u64)
                    .unwrap_or(0);

                let metadata = required(self.metadata.as_ref(), "metadata")?;
                let report = CompletionReport {
                    file: self.package.file.stats(),
                    file_checksum: &self.package.checksum,
                    checksum_time_ms: self.package.checksum_time_ms,
                    metadata_size: metadata.size,
                    transfer_time_ms: self.transfer_time_ms,
                    bytes_transferred: self.bytes_sent,
                };
                self.finalizer()?
                    .upload_done(&self.package_name, &report)
                    .await?;
                info!("The cookies are done.");
                Ok(Done)
            }
            Done | Failed => Ok(self.stage),
        }
    }

    /// Payload source and progress reporting, set up on the first transfer.
    fn begin_transfer(&mut self) -> UploadResult<Arc<PayloadSource>> {
        if let Some(source) = &self.source {
            return Ok(source.clone());
        }

        let metadata = required(self.metadata.as_ref(), "metadata")?;
        let total = metadata.size + self.package.file.size();
        let progress = self.engine.progress().clone();
        progress.set_total(total);

        let source = Arc::new(PayloadSource {
            metadata: metadata.buffer.clone(),
            package: self.package.file.clone(),
        });
        self.reporter = Some(ProgressReporter::spawn(
            progress,
            self.config.progress_interval,
        ));
        self.transfer_started = Some(Instant::now());
        self.source = Some(source.clone());
        Ok(source)
    }

    fn protocol(&self) -> UploadResult<ReservationProtocol<'_>> {
        let session = required(self.session.as_ref(), "session")?;
        Ok(ReservationProtocol::new(
            &self.service,
            session,
            &self.config.username,
        ))
    }

    fn finalizer(&self) -> UploadResult<CommitFinalizer<'_>> {
        let session = required(self.session.as_ref(), "session")?;
        Ok(CommitFinalizer::new(
            &self.service,
            session,
            &self.config.username,
        ))
    }

    fn submission(&self) -> UploadResult<PackageSubmission<'_>> {
        let identity = required(self.identity.as_ref(), "application identity")?;
        let metadata = required(self.metadata.as_ref(), "metadata")?;
        Ok(PackageSubmission {
            bundle: &self.package.bundle,
            apple_id: &identity.apple_id,
            metadata,
            file: self.package.file.stats(),
            file_checksum: &self.package.checksum,
        })
    }
}

fn required<'a, T>(value: Option<&'a T>, what: &str) -> UploadResult<&'a T> {
    value.ok_or_else(|| UploadError::Io(io::Error::other(format!("{} is not available yet", what))))
}

/// Resolve the package (downloading it first when remote) and run the upload.
///
/// A downloaded copy is removed when this future completes or is dropped.
pub async fn run_upload(config: RunConfig) -> UploadResult<UploadSummary> {
    let http = Client::new();

    let mut temp = None;
    let path = if is_remote_source(&config.source) {
        let mut last_decile = 0;
        let downloaded = download_temp_file(&http, &config.source, |done, total| {
            let decile = if total == 0 { 10 } else { done * 10 / total };
            if decile > last_decile {
                last_decile = decile;
                info!("Downloaded {}/{} bytes", done, total);
            }
        })
        .await?;
        let path = downloaded.path().to_path_buf();
        temp = Some(downloaded);
        path
    } else {
        PathBuf::from(&config.source)
    };

    let file = PackageFile::open(&path).await?;
    let logger: Arc<dyn TransferLogger> = Arc::new(TracingLogger);
    let context = UploadContext::prepare(config, http, file, logger).await?;
    let summary = context.run().await;

    if let Some(temp) = temp {
        debug!("Cleaning up {}", temp.path().display());
    }
    summary
}

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel::{Receiver, unbounded};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use tokio::task::JoinSet;

use transporter_package::PackageFile;
use transporter_types::api::CLIENT_USER_AGENT;
use transporter_types::{METADATA_FILE_NAME, Operation, Reservation, UploadError, UploadResult};

use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::progress::TransferProgress;

pub const DEFAULT_CONCURRENCY: usize = 4;

const COMPONENT: &str = "engine";

/// Where operation payloads come from: the in-memory metadata document or
/// positional reads of the package on disk.
pub struct PayloadSource {
    pub metadata: Bytes,
    pub package: PackageFile,
}

impl PayloadSource {
    /// Bytes for `op` of a reservation on `file`, or `None` when this run has
    /// no file by that name.
    pub async fn resolve(&self, file: &str, op: &Operation) -> UploadResult<Option<Bytes>> {
        if file == METADATA_FILE_NAME {
            let end = op.offset.checked_add(op.length);
            match end {
                Some(end) if end <= self.metadata.len() as u64 => {
                    Ok(Some(self.metadata.slice(op.offset as usize..end as usize)))
                }
                _ => Err(UploadError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "range {}+{} is outside {} ({} bytes)",
                        op.offset,
                        op.length,
                        METADATA_FILE_NAME,
                        self.metadata.len()
                    ),
                ))),
            }
        } else if file == self.package.file_name() {
            self.package.read_range(op.offset, op.length).await.map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Bookkeeping shared by the workers draining one reservation.
#[derive(Default)]
struct Batch {
    cancelled: AtomicBool,
    first_error: Mutex<Option<UploadError>>,
    bytes_sent: AtomicU64,
    started: AtomicUsize,
}

impl Batch {
    /// Keep the first error only; later ones are consequences.
    fn fail(&self, err: UploadError) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let mut slot = self.first_error.lock().unwrap_or_else(|p| p.into_inner());
            *slot = Some(err);
        }
    }

    fn take_error(&self) -> Option<UploadError> {
        self.first_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }
}

/// Executes a reservation's operations on a fixed pool of workers.
///
/// Workers pull from a shared queue. The first failure stops admission of new
/// operations; requests already on the wire are allowed to finish.
pub struct ChunkTransferEngine {
    http: Client,
    concurrency: usize,
    progress: Arc<TransferProgress>,
    logger: Arc<dyn TransferLogger>,
}

impl ChunkTransferEngine {
    pub fn new(
        http: Client,
        concurrency: usize,
        progress: Arc<TransferProgress>,
        logger: Arc<dyn TransferLogger>,
    ) -> Self {
        Self {
            http,
            concurrency: concurrency.max(1),
            progress,
            logger,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn progress(&self) -> &Arc<TransferProgress> {
        &self.progress
    }

    /// Drain every operation of `reservation`, returning the bytes sent.
    pub async fn transfer(
        &self,
        reservation: &Reservation,
        source: &Arc<PayloadSource>,
    ) -> UploadResult<u64> {
        let start = Instant::now();
        let total = reservation.operations.len();

        let (tx, rx) = unbounded::<(usize, Operation)>();
        for item in reservation.operations.iter().cloned().enumerate() {
            // Receiver is alive; send on an unbounded channel cannot fail.
            let _ = tx.send(item);
        }
        drop(tx);

        let batch = Arc::new(Batch::default());
        let workers = self.concurrency.min(total);
        // Dropping the set aborts the workers, so a cancelled transfer leaves
        // nothing running.
        let mut set = JoinSet::new();

        for _ in 0..workers {
            let worker = Worker {
                http: self.http.clone(),
                queue: rx.clone(),
                batch: batch.clone(),
                source: source.clone(),
                progress: self.progress.clone(),
                logger: self.logger.clone(),
                reservation_id: reservation.id.clone(),
                file: reservation.file.clone(),
            };
            set.spawn(worker.run());
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                batch.fail(UploadError::Io(io::Error::other(e)));
            }
        }

        if let Some(err) = batch.take_error() {
            self.log(
                &reservation.id,
                TransferEvent::BatchAborted {
                    started: batch.started.load(Ordering::Acquire),
                    total,
                },
            );
            return Err(err);
        }

        let bytes = batch.bytes_sent.load(Ordering::Acquire);
        self.log(
            &reservation.id,
            TransferEvent::ReservationDrained {
                file: reservation.file.clone(),
                operations: total,
                bytes,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        );
        Ok(bytes)
    }

    fn log(&self, reservation_id: &str, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: COMPONENT,
            reservation_id: reservation_id.to_string(),
            event,
        });
    }
}

struct Worker {
    http: Client,
    queue: Receiver<(usize, Operation)>,
    batch: Arc<Batch>,
    source: Arc<PayloadSource>,
    progress: Arc<TransferProgress>,
    logger: Arc<dyn TransferLogger>,
    reservation_id: String,
    file: String,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.batch.cancelled.load(Ordering::Acquire) {
                break;
            }
            let Ok((index, op)) = self.queue.try_recv() else {
                break;
            };
            // Lost the race with a failing sibling: leave the operation unstarted.
            if self.batch.cancelled.load(Ordering::Acquire) {
                break;
            }

            match self.execute(index, &op).await {
                Ok(sent) => {
                    self.batch.bytes_sent.fetch_add(sent, Ordering::AcqRel);
                }
                Err(err) => {
                    self.log(TransferEvent::OperationFailed {
                        index,
                        message: err.to_string(),
                    });
                    self.batch.fail(err);
                    break;
                }
            }
        }
    }

    async fn execute(&self, index: usize, op: &Operation) -> UploadResult<u64> {
        let Some(payload) = self.source.resolve(&self.file, op).await? else {
            self.log(TransferEvent::OperationSkipped {
                index,
                file: self.file.clone(),
            });
            return Ok(0);
        };

        self.batch.started.fetch_add(1, Ordering::AcqRel);
        self.log(TransferEvent::OperationStarted {
            index,
            offset: op.offset,
            length: op.length,
        });
        let start = Instant::now();

        let method = Method::from_bytes(op.method.as_bytes())
            .map_err(|e| UploadError::transfer(&op.uri, e.to_string()))?;
        let headers = operation_headers(op)?;

        let resp = self
            .http
            .request(method, &op.uri)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(|e| UploadError::transfer(&op.uri, e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(UploadError::transfer(
                &op.uri,
                format!("HTTP {}", resp.status()),
            ));
        }

        self.progress.record(op.length);
        self.log(TransferEvent::OperationCompleted {
            index,
            length: op.length,
            duration_ms: start.elapsed().as_millis() as u64,
        });
        Ok(op.length)
    }

    fn log(&self, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: COMPONENT,
            reservation_id: self.reservation_id.clone(),
            event,
        });
    }
}

/// Client identity first, then the operation's own headers, which win on
/// conflict.
fn operation_headers(op: &Operation) -> UploadResult<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(op.headers.len() + 1);
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    for (name, value) in &op.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| UploadError::transfer(&op.uri, format!("bad header {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| UploadError::transfer(&op.uri, format!("bad header {}: {}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

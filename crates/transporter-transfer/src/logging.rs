/// Structured transfer logging.
///
/// The engine reports what each worker does through a `TransferLogger` so the
/// binary can route it to `tracing` while tests stay quiet.

use std::fmt;

/// One structured log entry, scoped to a reservation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub reservation_id: String,
    pub event: TransferEvent,
}

#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Worker picked up an operation
    OperationStarted {
        index: usize,
        offset: u64,
        length: u64,
    },
    /// Remote answered 200
    OperationCompleted {
        index: usize,
        length: u64,
        duration_ms: u64,
    },
    OperationFailed {
        index: usize,
        message: String,
    },
    /// Reservation names a file this run does not carry
    OperationSkipped {
        index: usize,
        file: String,
    },
    /// First failure stopped admission of further operations
    BatchAborted {
        started: usize,
        total: usize,
    },
    /// Every operation of the reservation finished
    ReservationDrained {
        file: String,
        operations: usize,
        bytes: u64,
        duration_ms: u64,
    },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperationStarted { index, offset, length } => {
                write!(f, "operation_started idx={} offset={} length={}", index, offset, length)
            }
            Self::OperationCompleted { index, length, duration_ms } => {
                write!(f, "operation_completed idx={} length={} duration_ms={}", index, length, duration_ms)
            }
            Self::OperationFailed { index, message } => {
                write!(f, "operation_failed idx={} error={}", index, message)
            }
            Self::OperationSkipped { index, file } => {
                write!(f, "operation_skipped idx={} file={}", index, file)
            }
            Self::BatchAborted { started, total } => {
                write!(f, "batch_aborted started={} total={}", started, total)
            }
            Self::ReservationDrained { file, operations, bytes, duration_ms } => {
                write!(f, "reservation_drained file={} operations={} bytes={} duration_ms={}", file, operations, bytes, duration_ms)
            }
        }
    }
}

pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // Per-operation detail stays at debug.
        match &entry.event {
            TransferEvent::OperationFailed { .. } | TransferEvent::BatchAborted { .. } => {
                tracing::warn!(
                    component = entry.component,
                    reservation = %entry.reservation_id,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::ReservationDrained { .. } => {
                tracing::info!(
                    component = entry.component,
                    reservation = %entry.reservation_id,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::debug!(
                    component = entry.component,
                    reservation = %entry.reservation_id,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}

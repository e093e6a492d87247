use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Issues `YYYYMMDDHHmmss-SSS` request ids from the wall clock.
///
/// Ids are strictly increasing per generator: when two calls land in the same
/// millisecond the later one is pushed forward by 1 ms, so the fixed-width
/// format is kept and ids never repeat.
pub struct RequestIdGenerator {
    last_ms: AtomicI64,
}

impl RequestIdGenerator {
    pub const fn new() -> Self {
        Self {
            last_ms: AtomicI64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        self.next_id_at(Utc::now())
    }

    pub fn next_id_at(&self, now: DateTime<Utc>) -> String {
        let now_ms = now.timestamp_millis();
        let mut prev = self.last_ms.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(prev + 1);
            match self.last_ms.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format_request_id(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Format milliseconds since the epoch as a request id.
pub fn format_request_id(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .format("%Y%m%d%H%M%S-%3f")
        .to_string()
}

/// Transporter request signing.
///
/// Every producer call after authentication carries a session digest proving
/// possession of the shared secret:
///
/// ```text
/// x-session-digest = hex(MD5(session_id || MD5(body) || request_id || shared_secret))
/// ```
///
/// The body checksum is the raw 16-byte MD5 of the exact serialized JSON body,
/// so the body must be serialized once and sent as signed.

pub mod digest;
pub mod request_id;
pub mod signer;

pub use digest::{md5_hex, md5_raw, session_digest};
pub use request_id::{RequestIdGenerator, format_request_id};
pub use signer::{SESSION_VERSION, SigningHeaders, sign_request};

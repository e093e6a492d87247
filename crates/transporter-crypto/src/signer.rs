use transporter_types::UploadSession;

use crate::digest::{md5_raw, session_digest};

/// Value of the `x-session-version` header.
pub const SESSION_VERSION: &str = "2";

/// Headers attached to a signed RPC request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningHeaders {
    pub request_id: String,
    pub session_id: String,
    pub session_version: &'static str,
    pub session_digest: String,
}

impl SigningHeaders {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("x-request-id", self.request_id.as_str()),
            ("x-session-id", self.session_id.as_str()),
            ("x-session-version", self.session_version),
            ("x-session-digest", self.session_digest.as_str()),
        ]
    }
}

/// Sign a serialized request body for `session`.
pub fn sign_request(session: &UploadSession, body: &[u8], request_id: &str) -> SigningHeaders {
    let checksum = md5_raw(body);
    SigningHeaders {
        request_id: request_id.to_string(),
        session_id: session.session_id.clone(),
        session_version: SESSION_VERSION,
        session_digest: session_digest(
            &session.session_id,
            &checksum,
            request_id,
            &session.shared_secret,
        ),
    }
}

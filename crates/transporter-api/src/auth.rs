use tracing::info;

use transporter_types::api::{AuthenticateParams, AuthenticateResult, describe_failure};
use transporter_types::{UploadError, UploadResult, UploadSession};

use crate::client::{Endpoint, ServiceClient};

/// Exchange credentials for a session. This is the only unsigned producer call.
pub async fn authenticate(
    client: &ServiceClient,
    username: &str,
    password: &str,
) -> UploadResult<UploadSession> {
    let result: AuthenticateResult = client
        .call(
            None,
            Endpoint::Producer,
            "authenticateForSession",
            &AuthenticateParams { username, password },
        )
        .await?;

    match (result.session_id, result.shared_secret) {
        (Some(session_id), Some(shared_secret))
            if !session_id.is_empty() && !shared_secret.is_empty() =>
        {
            info!("Authenticated as {}", username);
            Ok(UploadSession {
                session_id,
                shared_secret,
            })
        }
        _ => Err(UploadError::Authentication(describe_failure(
            "Authentication failed!",
            result.error_message.as_deref(),
        ))),
    }
}

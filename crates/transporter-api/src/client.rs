use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use transporter_crypto::{RequestIdGenerator, sign_request};
use transporter_types::api::{RpcRequest, RpcResponse};
use transporter_types::{UploadResult, UploadSession};

pub use transporter_types::api::CLIENT_USER_AGENT;

pub const DEFAULT_SOFTWARE_SERVICE_URL: &str =
    "https://contentdelivery.itunes.apple.com/WebObjects/MZLabelService.woa/json/MZITunesSoftwareService";
pub const DEFAULT_PRODUCER_SERVICE_URL: &str =
    "https://contentdelivery.itunes.apple.com/WebObjects/MZLabelService.woa/json/MZITunesProducerService";

/// The two remote services an upload talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Read-only application lookup.
    Software,
    /// Everything bound to a session.
    Producer,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub software_url: String,
    pub producer_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            software_url: DEFAULT_SOFTWARE_SERVICE_URL.to_string(),
            producer_url: DEFAULT_PRODUCER_SERVICE_URL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Production URLs unless `TRANSPORTER_SOFTWARE_SERVICE_URL` /
    /// `TRANSPORTER_PRODUCER_SERVICE_URL` override them.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            software_url: std::env::var("TRANSPORTER_SOFTWARE_SERVICE_URL")
                .unwrap_or(defaults.software_url),
            producer_url: std::env::var("TRANSPORTER_PRODUCER_SERVICE_URL")
                .unwrap_or(defaults.producer_url),
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Software => &self.software_url,
            Endpoint::Producer => &self.producer_url,
        }
    }
}

/// JSON-RPC transport for both services.
///
/// The body is serialized exactly once; when a session is present the same
/// bytes are hashed into the session digest and sent.
pub struct ServiceClient {
    http: Client,
    config: ServiceConfig,
    ids: RequestIdGenerator,
}

impl ServiceClient {
    pub fn new(http: Client, config: ServiceConfig) -> Self {
        Self {
            http,
            config,
            ids: RequestIdGenerator::new(),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Send `method(params)` and decode the `result` member of the reply.
    ///
    /// Interpreting `Success` inside the result is left to the caller.
    pub async fn call<P, R>(
        &self,
        session: Option<&UploadSession>,
        endpoint: Endpoint,
        method: &str,
        params: &P,
    ) -> UploadResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request_id = self.ids.next_id();
        let body = serde_json::to_vec(&RpcRequest::new(method, &request_id, params))?;

        let mut req = self
            .http
            .post(self.config.url(endpoint))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(CONTENT_TYPE, "application/json");

        if let Some(session) = session {
            let signing = sign_request(session, &body, &request_id);
            for (name, value) in signing.pairs() {
                req = req.header(name, value);
            }
        }

        debug!(method, id = %request_id, signed = session.is_some(), "rpc call");

        let resp = req.body(body).send().await?.error_for_status()?;
        let bytes = resp.bytes().await?;
        let decoded: RpcResponse<R> = serde_json::from_slice(&bytes)?;

        debug!(method, id = %request_id, "rpc reply");
        Ok(decoded.result)
    }
}

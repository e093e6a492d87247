/// Drives the RPC layer against an in-process fake of both services.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Json;
use serde_json::{Value, json};

use transporter_api::{
    CommitFinalizer, CompletionReport, INITIAL_PACKAGE_NAME, PackageSubmission,
    ReservationProtocol, ServiceClient, ServiceConfig, authenticate,
};
use transporter_crypto::{md5_raw, session_digest};
use transporter_types::{
    AppleId, BundleDescriptor, FileStats, MetadataArtifact, Reservation, UploadError,
    UploadSession, ValidationStage,
};

#[derive(Debug, Clone)]
struct Recorded {
    service: &'static str,
    method: String,
    headers: HeaderMap,
    raw: Bytes,
    params: Value,
}

#[derive(Clone, Default)]
struct Fake {
    replies: Arc<HashMap<&'static str, Value>>,
    calls: Arc<Mutex<Vec<Recorded>>>,
}

impl Fake {
    fn with(replies: &[(&'static str, Value)]) -> Self {
        Self {
            replies: Arc::new(replies.iter().cloned().collect()),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }
}

async fn record(fake: &Fake, service: &'static str, headers: HeaderMap, raw: Bytes) -> Json<Value> {
    let request: Value = serde_json::from_slice(&raw).unwrap();
    let method = request["method"].as_str().unwrap().to_string();
    let reply = fake
        .replies
        .get(method.as_str())
        .cloned()
        .unwrap_or_else(|| json!({ "Success": true }));
    fake.calls.lock().unwrap().push(Recorded {
        service,
        method,
        headers,
        params: request["params"].clone(),
        raw,
    });
    Json(json!({ "result": reply }))
}

async fn software(State(fake): State<Fake>, headers: HeaderMap, raw: Bytes) -> Json<Value> {
    record(&fake, "software", headers, raw).await
}

async fn producer(State(fake): State<Fake>, headers: HeaderMap, raw: Bytes) -> Json<Value> {
    record(&fake, "producer", headers, raw).await
}

async fn start(fake: Fake) -> ServiceClient {
    let app = Router::new()
        .route("/software", post(software))
        .route("/producer", post(producer))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ServiceClient::new(
        reqwest::Client::new(),
        ServiceConfig {
            software_url: format!("http://{}/software", addr),
            producer_url: format!("http://{}/producer", addr),
        },
    )
}

fn session() -> UploadSession {
    UploadSession {
        session_id: "SESSION-ID".into(),
        shared_secret: "SECRET".into(),
    }
}

struct Fixture {
    bundle: BundleDescriptor,
    apple_id: AppleId,
    metadata: MetadataArtifact,
    file: FileStats,
}

impl Fixture {
    fn new() -> Self {
        Self {
            bundle: BundleDescriptor {
                bundle_id: "com.example.cookies".into(),
                bundle_version: "7".into(),
                bundle_short_version: "1.0.7".into(),
            },
            apple_id: AppleId::Numeric(1_234_567_890),
            metadata: MetadataArtifact {
                buffer: Bytes::from_static(b"<package/>"),
                checksum: "META_MD5".into(),
                compressed_base64: "H4sI".into(),
                size: 406,
            },
            file: FileStats {
                file_name: "Cookies.ipa".into(),
                size: 12_345,
                modified_ms: 1_577_930_645_678,
            },
        }
    }

    fn submission(&self) -> PackageSubmission<'_> {
        PackageSubmission {
            bundle: &self.bundle,
            apple_id: &self.apple_id,
            metadata: &self.metadata,
            file: &self.file,
            file_checksum: "FILE_MD5",
        }
    }
}

#[tokio::test]
async fn authentication_is_unsigned_and_yields_session() {
    let fake = Fake::with(&[(
        "authenticateForSession",
        json!({ "SessionId": "S1", "SharedSecret": "K1" }),
    )]);
    let client = start(fake.clone()).await;

    let session = authenticate(&client, "dev@example.com", "hunter2").await.unwrap();
    assert_eq!(session.session_id, "S1");
    assert_eq!(session.shared_secret, "K1");

    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.service, "producer");
    assert_eq!(call.params, json!({ "Username": "dev@example.com", "Password": "hunter2" }));
    assert_eq!(call.headers["user-agent"], "iTMSTransporter/2.0.0");
    assert_eq!(call.headers["content-type"], "application/json");
    assert!(call.headers.get("x-session-id").is_none());
    assert!(call.headers.get("x-session-digest").is_none());
}

#[tokio::test]
async fn authentication_failure_carries_remote_message() {
    let fake = Fake::with(&[(
        "authenticateForSession",
        json!({ "ErrorMessage": "Invalid credentials" }),
    )]);
    let client = start(fake).await;

    let err = authenticate(&client, "dev@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, UploadError::Authentication(_)));
    assert_eq!(err.to_string(), "Authentication failed!\nInvalid credentials");
}

#[tokio::test]
async fn signed_calls_carry_a_verifiable_digest() {
    let fake = Fake::with(&[(
        "lookupSoftwareForBundleId",
        json!({
            "Success": true,
            "Attributes": [{ "AppleID": 1234567890u64, "Application": "Cookies", "IconURL": "https://x/icon.png" }]
        }),
    )]);
    let client = start(fake.clone()).await;
    let session = session();

    let identity = ReservationProtocol::new(&client, &session, "dev@example.com")
        .lookup("com.example.cookies")
        .await
        .unwrap();
    assert_eq!(identity.apple_id, AppleId::Numeric(1_234_567_890));
    assert_eq!(identity.app_name, "Cookies");

    let calls = fake.calls();
    let call = &calls[0];
    assert_eq!(call.service, "software");
    assert_eq!(
        call.params,
        json!({
            "Application": "altool",
            "ApplicationBundleId": "com.apple.itunes.altool",
            "BundleId": "com.example.cookies",
            "Version": "4.0.1 (1182)"
        })
    );

    let request_id = call.headers["x-request-id"].to_str().unwrap();
    assert_eq!(request_id.len(), 18);
    assert_eq!(call.headers["x-session-id"], "SESSION-ID");
    assert_eq!(call.headers["x-session-version"], "2");
    let expected = session_digest("SESSION-ID", &md5_raw(&call.raw), request_id, "SECRET");
    assert_eq!(call.headers["x-session-digest"].to_str().unwrap(), expected);

    let envelope: Value = serde_json::from_slice(&call.raw).unwrap();
    assert_eq!(envelope["jsonrpc"], "2.0");
    assert_eq!(envelope["id"], request_id);
}

#[tokio::test]
async fn unknown_bundle_fails_lookup() {
    let fake = Fake::with(&[(
        "lookupSoftwareForBundleId",
        json!({ "Success": true, "Attributes": [] }),
    )]);
    let client = start(fake.clone()).await;
    let session = session();

    let err = ReservationProtocol::new(&client, &session, "dev@example.com")
        .lookup("com.example.unknown")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Lookup(_)));
    assert_eq!(err.to_string(), "Failed to lookup Apple ID for bundle!");
    assert_eq!(fake.methods(), vec!["lookupSoftwareForBundleId"]);
}

#[tokio::test]
async fn asset_validation_renames_package_for_later_calls() {
    let fake = Fake::with(&[
        (
            "validateAssets",
            json!({ "Success": true, "NewPackageName": "1234567890_renamed.itmsp" }),
        ),
        (
            "createReservation",
            json!({
                "Success": true,
                "Reservations": [
                    { "id": "R1", "file": "metadata.xml", "operations": [
                        { "uri": "http://x/1", "method": "PUT", "headers": {}, "offset": 0, "length": 406 }
                    ]},
                    { "id": "R2", "file": "Cookies.ipa", "operations": [] }
                ]
            }),
        ),
    ]);
    let client = start(fake.clone()).await;
    let session = session();
    let fixture = Fixture::new();
    let submission = fixture.submission();
    let protocol = ReservationProtocol::new(&client, &session, "dev@example.com");
    let finalizer = CommitFinalizer::new(&client, &session, "dev@example.com");

    let mut package_name = INITIAL_PACKAGE_NAME.to_string();
    protocol.validate_metadata(&submission, &package_name).await.unwrap();
    protocol.validate_assets(&submission, &mut package_name).await.unwrap();
    assert_eq!(package_name, "1234567890_renamed.itmsp");

    protocol.client_checksum_completed(&package_name).await.unwrap();
    let reservations: Vec<Reservation> =
        protocol.create_reservation(&submission, &package_name).await.unwrap();
    assert_eq!(reservations.len(), 2);
    assert_eq!(reservations[0].total_length(), 406);

    for reservation in &reservations {
        finalizer.commit(&package_name, reservation).await.unwrap();
    }
    finalizer
        .upload_done(
            &package_name,
            &CompletionReport {
                file: &fixture.file,
                file_checksum: "FILE_MD5",
                checksum_time_ms: 12,
                metadata_size: fixture.metadata.size,
                transfer_time_ms: 345,
                bytes_transferred: 12_751,
            },
        )
        .await
        .unwrap();

    let calls = fake.calls();
    assert_eq!(
        fake.methods(),
        vec![
            "validateMetadata",
            "validateAssets",
            "clientChecksumCompleted",
            "createReservation",
            "commitReservation",
            "commitReservation",
            "uploadDoneWithArguments",
        ]
    );

    let metadata = &calls[0].params;
    assert_eq!(metadata["PackageName"], "app.itmsp");
    assert_eq!(metadata["PackageSize"], 12_751);
    assert_eq!(metadata["Files"], json!(["Cookies.ipa", "metadata.xml"]));
    assert_eq!(metadata["MetadataChecksum"], "META_MD5");
    assert_eq!(metadata["MetadataInfo"]["apple_id"], 1_234_567_890u64);
    assert_eq!(metadata["MetadataInfo"]["packageVersion"], "software5.4");

    let assets = &calls[1].params;
    assert_eq!(assets["Transport"], "HTTP");
    assert_eq!(assets["AssetDescriptionsCompressed"], json!([]));

    for call in &calls[2..] {
        assert_eq!(call.params["NewPackageName"], "1234567890_renamed.itmsp", "{}", call.method);
        assert_eq!(call.params["iTMSTransporterMode"], "upload");
    }

    let descriptions = &calls[3].params["fileDescriptions"];
    assert_eq!(descriptions[0]["fileName"], "metadata.xml");
    assert_eq!(descriptions[1]["uti"], "com.apple.ipa");

    assert_eq!(calls[4].params["reservations"], json!(["R1"]));
    assert_eq!(calls[5].params["reservations"], json!(["R2"]));

    let done = &calls[6].params;
    assert_eq!(done["FileSizeInfo"], json!({ "Cookies.ipa": 12345, "metadata.xml": 406 }));
    assert_eq!(done["ClientChecksumInfo"][0]["FileLastModified"], 1_577_930_645_678i64);
    assert_eq!(done["ClientChecksumInfo"][0]["fileSize"], 12_345);
    assert_eq!(done["TransferTime"], 345);
    assert_eq!(done["NumberBytesTransferred"], 12_751);
    assert!(done["PackagePathWithoutBase"].is_null());
}

#[tokio::test]
async fn rejected_metadata_is_a_validation_error() {
    let fake = Fake::with(&[(
        "validateMetadata",
        json!({ "Success": false, "ErrorMessage": "ERROR ITMS-90062" }),
    )]);
    let client = start(fake).await;
    let session = session();
    let fixture = Fixture::new();

    let err = ReservationProtocol::new(&client, &session, "dev@example.com")
        .validate_metadata(&fixture.submission(), INITIAL_PACKAGE_NAME)
        .await
        .unwrap_err();

    match err {
        UploadError::Validation { stage, message } => {
            assert_eq!(stage, ValidationStage::Metadata);
            assert_eq!(message, "Metadata validation failed!\nERROR ITMS-90062");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_new_package_name_keeps_current_name() {
    let fake = Fake::with(&[("validateAssets", json!({ "Success": true }))]);
    let client = start(fake).await;
    let session = session();
    let fixture = Fixture::new();

    let mut package_name = INITIAL_PACKAGE_NAME.to_string();
    ReservationProtocol::new(&client, &session, "dev@example.com")
        .validate_assets(&fixture.submission(), &mut package_name)
        .await
        .unwrap();
    assert_eq!(package_name, "app.itmsp");
}

#[tokio::test]
async fn failed_commit_is_a_commit_error() {
    let fake = Fake::with(&[("commitReservation", json!({ "Success": false }))]);
    let client = start(fake).await;
    let session = session();
    let reservation = Reservation {
        id: "R1".into(),
        file: "metadata.xml".into(),
        operations: Vec::new(),
    };

    let err = CommitFinalizer::new(&client, &session, "dev@example.com")
        .commit("app.itmsp", &reservation)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Commit(_)));
    assert_eq!(err.to_string(), "Commit reservation failed!");
}

#[tokio::test]
async fn lookup_match_without_apple_id_fails_lookup() {
    let fake = Fake::with(&[(
        "lookupSoftwareForBundleId",
        json!({ "Success": true, "Attributes": [{ "Application": "Cookies" }] }),
    )]);
    let client = start(fake).await;
    let session = session();

    let err = ReservationProtocol::new(&client, &session, "dev@example.com")
        .lookup("com.example.cookies")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Lookup(_)));
    assert_eq!(err.to_string(), "Failed to lookup Apple ID for bundle!");
}

#[tokio::test]
async fn rejected_assets_are_a_validation_error() {
    let fake = Fake::with(&[(
        "validateAssets",
        json!({ "Success": false, "ErrorMessage": "ERROR ITMS-90189" }),
    )]);
    let client = start(fake).await;
    let session = session();
    let fixture = Fixture::new();

    let mut package_name = INITIAL_PACKAGE_NAME.to_string();
    let err = ReservationProtocol::new(&client, &session, "dev@example.com")
        .validate_assets(&fixture.submission(), &mut package_name)
        .await
        .unwrap_err();

    match err {
        UploadError::Validation { stage, message } => {
            assert_eq!(stage, ValidationStage::Assets);
            assert_eq!(message, "Asset validation failed!\nERROR ITMS-90189");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(package_name, "app.itmsp");
}

#[tokio::test]
async fn rejected_checksum_ack_is_a_validation_error() {
    let fake = Fake::with(&[(
        "clientChecksumCompleted",
        json!({ "Success": false, "ErrorMessage": "Checksum mismatch" }),
    )]);
    let client = start(fake).await;
    let session = session();

    let err = ReservationProtocol::new(&client, &session, "dev@example.com")
        .client_checksum_completed(INITIAL_PACKAGE_NAME)
        .await
        .unwrap_err();

    match err {
        UploadError::Validation { stage, message } => {
            assert_eq!(stage, ValidationStage::ClientChecksum);
            assert_eq!(message, "Client checksum failed!\nChecksum mismatch");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn refused_reservation_is_a_reservation_error() {
    let fake = Fake::with(&[(
        "createReservation",
        json!({ "Success": false, "ErrorMessage": "Quota exceeded" }),
    )]);
    let client = start(fake).await;
    let session = session();
    let fixture = Fixture::new();

    let err = ReservationProtocol::new(&client, &session, "dev@example.com")
        .create_reservation(&fixture.submission(), INITIAL_PACKAGE_NAME)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Reservation(_)));
    assert_eq!(err.to_string(), "Create reservation failed!\nQuota exceeded");
}

#[tokio::test]
async fn refused_completion_is_a_completion_error() {
    let fake = Fake::with(&[(
        "uploadDoneWithArguments",
        json!({ "Success": false, "ErrorMessage": "Package incomplete" }),
    )]);
    let client = start(fake).await;
    let session = session();
    let fixture = Fixture::new();

    let err = CommitFinalizer::new(&client, &session, "dev@example.com")
        .upload_done(
            INITIAL_PACKAGE_NAME,
            &CompletionReport {
                file: &fixture.file,
                file_checksum: "FILE_MD5",
                checksum_time_ms: 12,
                metadata_size: fixture.metadata.size,
                transfer_time_ms: 345,
                bytes_transferred: 12_751,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Completion(_)));
    assert_eq!(err.to_string(), "Upload completion failed!\nPackage incomplete");
}

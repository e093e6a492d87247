pub mod auth;
pub mod client;
pub mod commit;
pub mod reservation;

pub use auth::authenticate;
pub use client::{
    CLIENT_USER_AGENT, DEFAULT_PRODUCER_SERVICE_URL, DEFAULT_SOFTWARE_SERVICE_URL, Endpoint,
    ServiceClient, ServiceConfig,
};
pub use commit::{CommitFinalizer, CompletionReport};
pub use reservation::{
    INITIAL_PACKAGE_NAME, PackageSubmission, ReservationProtocol, file_descriptions,
};

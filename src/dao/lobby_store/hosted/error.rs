//! Error types shared by the hosted datastore implementation.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`HostedDaoError`] failures.
pub type HostedResult<T> = Result<T, HostedDaoError>;

/// Failures that can occur while talking to the hosted datastore.
#[derive(Debug, Error)]
pub enum HostedDaoError {
    /// Required environment variable is missing.
    #[error("missing datastore environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build datastore client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request to a collection endpoint could not be sent.
    #[error("failed to send datastore request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The datastore returned an unexpected status code.
    #[error("unexpected datastore response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// Response payload could not be decoded into the expected rows.
    #[error("failed to decode datastore response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// An insert asked for its representation but got no row back.
    #[error("datastore returned no row for insert into `{path}`")]
    MissingRepresentation { path: String },
}

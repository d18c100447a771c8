use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by service clients.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The service rejected the call because required arguments were omitted.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// The referenced assistant profile does not exist on the service side.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// Any other structured error reported by the service.
    #[error("service error ({status}): {message}")]
    Service { status: StatusCode, message: String },

    /// Transport-level failure passed through untranslated: connection and
    /// timeout errors, 5xx statuses, and 4xx responses whose body carries no
    /// decodable error payload.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A configuration value cannot form a valid HTTP header.
    #[error("invalid {name} header value")]
    Header {
        name: &'static str,
        #[source]
        source: reqwest::header::InvalidHeaderValue,
    },
}

/// Structured error body returned by the service for request-level failures.
///
/// Both fields are required: a body missing either one fails to decode, and
/// the dispatch path re-raises the transport error instead of translating.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceErrorPayload {
    pub error: String,
    pub message: String,
}

impl ServiceErrorPayload {
    /// Map the service error code onto the client error taxonomy.
    pub fn into_error(self, status: StatusCode) -> ClientError {
        match self.error.as_str() {
            "MissedRequiredArguments" => ClientError::MissingArgument(self.message),
            "AssistantProfileNotFound" => ClientError::ProfileNotFound(self.message),
            _ => ClientError::Service {
                status,
                message: self.message,
            },
        }
    }
}

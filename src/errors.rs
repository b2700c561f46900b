// Error types shared by the document client, the search session and the validators

use std::fmt;
use thiserror::Error;

use crate::validations::ValidationErrors;

// Context attached to every error raised from an HTTP status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub request_url: String,
    pub status_code: u16,
    pub response_body: String,
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status code: {}\nRequest url: {}\n\n\n{}",
            self.status_code, self.request_url, self.response_body
        )
    }
}

#[derive(Error, Debug)]
pub enum TapiError {
    #[error("Moved: {0}")]
    Moved(HttpFailure),

    #[error("Expired: {0}")]
    Expired(HttpFailure),

    // Also raised for 401, which the API reports this way
    #[error("Internal server error: {0}")]
    InternalServerError(HttpFailure),

    #[error("Not found: {0}")]
    NotFound(HttpFailure),

    #[error("HTTP error: {0}")]
    Http(HttpFailure),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("undefined method `{name}' for {owner}")]
    MethodNotFound { name: String, owner: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Search is invalid: {0}")]
    InvalidSearch(ValidationErrors),

    #[error("No cached document for unchanged resource {0}")]
    NotCached(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TapiError {
    pub fn method_not_found(name: impl Into<String>, owner: impl Into<String>) -> Self {
        TapiError::MethodNotFound {
            name: name.into(),
            owner: owner.into(),
        }
    }

    // Status context of errors that came from a response
    pub fn http_failure(&self) -> Option<&HttpFailure> {
        match self {
            TapiError::Moved(failure)
            | TapiError::Expired(failure)
            | TapiError::InternalServerError(failure)
            | TapiError::NotFound(failure)
            | TapiError::Http(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.http_failure().map(|failure| failure.status_code)
    }
}

impl From<reqwest::Error> for TapiError {
    fn from(err: reqwest::Error) -> Self {
        TapiError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TapiError>;

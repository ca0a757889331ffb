use crate::types::StatusCategory;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response parsing error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("decryption error")]
    Decryption,

    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// Map this error onto the status category the subscribe loop reports.
    pub fn category(&self) -> StatusCategory {
        match self {
            Error::Validation(_) => StatusCategory::BadRequest,
            Error::Http(e) if e.is_timeout() => StatusCategory::Timeout,
            Error::Http(_) => StatusCategory::UnexpectedDisconnect,
            Error::Api { status, .. } => match status {
                403 => StatusCategory::AccessDenied,
                400 => StatusCategory::BadRequest,
                // 408/429 behave like a timed-out request: retryable.
                408 | 429 => StatusCategory::Timeout,
                s if *s >= 500 => StatusCategory::UnexpectedDisconnect,
                414 => StatusCategory::UnexpectedDisconnect,
                _ => StatusCategory::BadRequest,
            },
            Error::Parse(_) | Error::MalformedResponse(_) => StatusCategory::DecodingError,
            Error::Decryption => StatusCategory::DecryptionError,
            Error::Url(_) => StatusCategory::BadRequest,
            Error::Cancelled => StatusCategory::Cancelled,
        }
    }

    /// Whether the reconnection controller should schedule a retry.
    pub(crate) fn is_recoverable(&self) -> bool {
        match self {
            Error::Api { status: 414, .. } => true,
            _ => self.category().is_recoverable(),
        }
    }

    /// A 414 means the timetoken in the URL is no longer acceptable; the
    /// retry must re-handshake from `(0, 0)`.
    pub(crate) fn is_fatal_to_cursor(&self) -> bool {
        matches!(self, Error::Api { status: 414, .. })
    }
}

use axum::http::StatusCode;

use crate::config::store::StorageError;

/// Everything a setup or upload request can be rejected with.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("messaging session is not paired yet; scan the QR code first")]
    NotReady,

    #[error("manager password is not set; complete setup first")]
    SetupRequired,

    #[error("password is incorrect")]
    Unauthorized,

    #[error("{0}")]
    InvalidInput(String),

    #[error("too many files; max is {max}")]
    TooManyFiles { max: usize },

    #[error("unsupported file type {mime_type:?} for {filename}; upload an image or video")]
    UnsupportedMediaType { filename: String, mime_type: String },

    #[error("{filename} is too large; max size is {max_bytes} bytes")]
    FileTooLarge { filename: String, max_bytes: u64 },

    #[error("no text or media provided")]
    EmptyContent,

    #[error("delivery failed after {sent} item(s) were posted: {cause}")]
    DeliveryFailed { sent: usize, cause: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl GateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::SetupRequired => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) | Self::UnsupportedMediaType { .. } | Self::EmptyContent => {
                StatusCode::BAD_REQUEST
            }
            Self::TooManyFiles { .. } | Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DeliveryFailed { .. } | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_map_to_client_statuses() {
        assert_eq!(GateError::EmptyContent.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GateError::TooManyFiles { max: 15 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GateError::UnsupportedMediaType {
                filename: "a.pdf".into(),
                mime_type: "application/pdf".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn delivery_failure_keeps_the_cause() {
        let err = GateError::DeliveryFailed {
            sent: 2,
            cause: "socket closed".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("socket closed"));
        assert!(err.to_string().contains("after 2 item(s)"));
    }
}

//! Error taxonomy for the completion pipeline and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use crate::inference::InferenceError;

/// Failure to turn uploaded bytes into a [`crate::sheet_codec::Sheet`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Uploaded file is empty")]
    Empty,
    #[error("Unsupported file type: .{0}")]
    UnsupportedExtension(String),
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to open Excel workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),
    #[error("Workbook has no worksheets")]
    NoWorksheet,
    #[error("Sheet has no header row")]
    NoHeader,
}

/// Failure to serialize a completed sheet.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to write workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("Sheet has too many {0} for a worksheet")]
    TooLarge(&'static str),
}

/// Everything an upload request can fail with.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Unsupported file type. Only .xlsx and .csv files are allowed.")]
    UnsupportedFileType,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Inference(_) => StatusCode::BAD_GATEWAY,
            Self::Encode(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client. Server-side failures stay generic.
    pub fn public_message(&self) -> String {
        match self {
            Self::Inference(_) => "Inference backend failed.".to_string(),
            Self::Encode(_) | Self::Internal(_) => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Upload failed: {:?}", self);
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::validation("Missing 'prompt' in the request.").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::UnsupportedFileType.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            AppError::from(DecodeError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(InferenceError::Transport("refused".into())).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = AppError::Internal(anyhow::anyhow!("disk on fire at /var/secret"));
        assert_eq!(err.public_message(), "Internal server error.");
    }
}

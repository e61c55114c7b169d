use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docfmt_core::ConvertError;
use thiserror::Error;

pub const NO_FILE_MESSAGE: &str = "No file uploaded.";
pub const UNSUPPORTED_FORMAT_MESSAGE: &str = "Please upload a .docx or .pdf file only.";
pub const NOT_DOCX_MESSAGE: &str = "Please upload a .docx file.";
pub const PROCESSING_FAILED_MESSAGE: &str = "Error processing the file.";

/// Everything that can end an upload request early.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no file uploaded")]
    NoFile,
    #[error("unsupported file type: {filename}")]
    UnsupportedFormat { filename: String },
    #[error("not a .docx manuscript: {filename}")]
    NotDocx { filename: String },
    #[error("missing form field: {name}")]
    MissingField { name: &'static str },
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConvertError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("conversion task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoFile
            | Self::UnsupportedFormat { .. }
            | Self::NotDocx { .. }
            | Self::MissingField { .. } => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Conversion(_) | Self::Io(_) | Self::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Response body. Server-side failures never leak detail to the client.
    pub fn body(&self) -> String {
        match self {
            Self::NoFile => NO_FILE_MESSAGE.to_string(),
            Self::UnsupportedFormat { .. } => UNSUPPORTED_FORMAT_MESSAGE.to_string(),
            Self::NotDocx { .. } => NOT_DOCX_MESSAGE.to_string(),
            Self::MissingField { name } => format!("Missing form field: {name}"),
            Self::Multipart(e) => e.body_text(),
            Self::Conversion(_) | Self::Io(_) | Self::Join(_) => {
                PROCESSING_FAILED_MESSAGE.to_string()
            }
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use tokio_util::io::ReaderStream;

use crate::error::UploadError;
use crate::upload::UploadWorkspace;

pub mod process;
pub mod upload;

/// Log a failed request in its span and turn the error into a response.
fn respond(span: &tracing::Span, result: Result<Response, UploadError>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                span.in_scope(|| tracing::error!(error = %e, "failed to process upload"));
            } else {
                span.in_scope(|| tracing::debug!(error = %e, "rejected upload"));
            }
            e.into_response()
        }
    }
}

/// Stream the workspace output back as an attachment named `filename`.
async fn deliver(
    workspace: Arc<UploadWorkspace>,
    content_type: &'static str,
    filename: &str,
) -> Result<Response, UploadError> {
    let file = tokio::fs::File::open(workspace.output_path()).await?;
    let len = file.metadata().await?.len();
    tracing::info!(bytes = len, "sending converted document");

    let body = Body::from_stream(WorkspaceStream {
        inner: ReaderStream::new(file),
        _workspace: workspace,
    });

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        body,
    )
        .into_response())
}

/// Response body that holds the request workspace, so the directory is
/// removed once the body has been sent or the client goes away.
struct WorkspaceStream {
    inner: ReaderStream<tokio::fs::File>,
    _workspace: Arc<UploadWorkspace>,
}

impl Stream for WorkspaceStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

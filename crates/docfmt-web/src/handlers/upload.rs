use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Response;
use docfmt_core::SourceFormat;
use tracing::Instrument;

use crate::error::UploadError;
use crate::state::AppState;
use crate::upload::{self, OUTPUT_FILENAME, UploadWorkspace};

/// `POST /upload`: store the upload, convert it, and stream the result back.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let span = tracing::info_span!(
        "upload",
        request = tracing::field::Empty,
        format = tracing::field::Empty
    );

    let result = handle_upload(state, multipart).instrument(span.clone()).await;
    super::respond(&span, result)
}

async fn handle_upload(
    state: Arc<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, UploadError> {
    // A body that isn't multipart can't carry a file field.
    let multipart = multipart.map_err(|_| UploadError::NoFile)?;
    let file = upload::read_upload(multipart).await?;

    let format = SourceFormat::from_filename(&file.filename).ok_or_else(|| {
        UploadError::UnsupportedFormat {
            filename: file.filename.clone(),
        }
    })?;

    let workspace = Arc::new(UploadWorkspace::create(
        &state.upload_dir,
        format,
        OUTPUT_FILENAME,
    )?);
    let span = tracing::Span::current();
    span.record("request", workspace.token().as_str());
    span.record("format", format.extension());
    tracing::info!(filename = %file.filename, bytes = file.data.len(), "received upload");

    let options = state.convert;
    let data = file.data;
    workspace
        .clone()
        .run_blocking(move |ws| {
            std::fs::write(ws.input_path(), &data)?;
            docfmt_core::convert(format, ws.input_path(), ws.output_path(), &options)?;
            Ok(())
        })
        .await?;

    super::deliver(workspace, "application/pdf", OUTPUT_FILENAME).await
}

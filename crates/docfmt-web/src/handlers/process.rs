use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Response;
use docfmt_core::{PublicationFields, SourceFormat};
use tracing::Instrument;

use crate::error::UploadError;
use crate::state::AppState;
use crate::upload::{self, UploadForm, UploadWorkspace};

/// Name the formatted manuscript is offered for download as.
pub const PUBLICATION_FILENAME: &str = "formatted_publication.docx";
const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// `POST /process`: format a `.docx` manuscript for journal publication.
///
/// Besides `file`, the form carries one text field per
/// [`PublicationFields`] member (`journal_name`, `doi`, `footer_text`, ...).
pub async fn process(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let span = tracing::info_span!("process", request = tracing::field::Empty);

    let result = handle_process(state, multipart).instrument(span.clone()).await;
    super::respond(&span, result)
}

async fn handle_process(
    state: Arc<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, UploadError> {
    let multipart = multipart.map_err(|_| UploadError::NoFile)?;
    let UploadForm { file, fields } = upload::read_form(multipart).await?;
    let file = file.ok_or(UploadError::NoFile)?;

    if SourceFormat::from_filename(&file.filename) != Some(SourceFormat::Docx) {
        return Err(UploadError::NotDocx {
            filename: file.filename,
        });
    }
    let publication = PublicationFields::from_lookup(|name| fields.get(name).cloned())
        .map_err(|name| UploadError::MissingField { name })?;

    let workspace = Arc::new(UploadWorkspace::create(
        &state.upload_dir,
        SourceFormat::Docx,
        PUBLICATION_FILENAME,
    )?);
    tracing::Span::current().record("request", workspace.token().as_str());
    tracing::info!(
        filename = %file.filename,
        bytes = file.data.len(),
        journal = %publication.journal_name,
        "received manuscript"
    );

    let data = file.data;
    workspace
        .clone()
        .run_blocking(move |ws| {
            std::fs::write(ws.input_path(), &data)?;
            docfmt_core::format_publication(ws.input_path(), ws.output_path(), &publication)?;
            Ok(())
        })
        .await?;

    super::deliver(workspace, DOCX_CONTENT_TYPE, PUBLICATION_FILENAME).await
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Multipart;
use docfmt_core::SourceFormat;
use tempfile::TempDir;

use crate::error::UploadError;

/// Name of the multipart field carrying the document.
pub const FILE_FIELD: &str = "file";
/// Name the converted document is written under and offered for download as.
pub const OUTPUT_FILENAME: &str = "formatted.pdf";

/// An uploaded file with its data and metadata.
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

/// A multipart form: the document plus any plain text fields.
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

/// Read a whole multipart form.
///
/// The first `file` field with a non-empty filename is the document. Other
/// file parts are drained and ignored. For text fields the first value of
/// each name wins.
pub async fn read_form(mut multipart: Multipart) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm {
        file: None,
        fields: HashMap::new(),
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        match field.file_name().map(str::to_string) {
            Some(filename) => {
                if form.file.is_none() && name == FILE_FIELD && !filename.is_empty() {
                    let data = field.bytes().await?;
                    form.file = Some(UploadedFile { filename, data });
                } else {
                    // Ignore unknown fields
                    let _ = field.bytes().await?;
                }
            }
            None => {
                let data = field.bytes().await?;
                form.fields
                    .entry(name)
                    .or_insert_with(|| String::from_utf8_lossy(&data).into_owned());
            }
        }
    }

    Ok(form)
}

/// Pull the document out of a multipart upload.
pub async fn read_upload(multipart: Multipart) -> Result<UploadedFile, UploadError> {
    read_form(multipart).await?.file.ok_or(UploadError::NoFile)
}

/// A per-request directory under the upload root holding the stored upload
/// and the converted output.
///
/// The directory and its contents are removed when the last handle to it is
/// dropped.
#[derive(Debug)]
pub struct UploadWorkspace {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl UploadWorkspace {
    pub fn create(
        upload_dir: &Path,
        format: SourceFormat,
        output_name: &str,
    ) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("req-")
            .tempdir_in(upload_dir)?;
        let input = dir.path().join(format!("upload.{}", format.extension()));
        let output = dir.path().join(output_name);
        Ok(Self { dir, input, output })
    }

    /// Run synchronous document work on the blocking pool.
    ///
    /// The closure keeps its own handle on the workspace. If the request is
    /// abandoned while the work is running, the directory is removed only
    /// after the closure returns.
    pub async fn run_blocking<T, F>(self: Arc<Self>, f: F) -> Result<T, UploadError>
    where
        T: Send + 'static,
        F: FnOnce(&UploadWorkspace) -> Result<T, UploadError> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(&self)).await?
    }

    /// Unique name of this request's directory, used to correlate logs.
    pub fn token(&self) -> String {
        self.dir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }
}

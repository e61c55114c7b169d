use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod docx;
pub mod format;
pub mod pdf;
pub mod publication;
mod wml;

// Re-export for convenience
pub use docx::{DocxMode, write_docx};
pub use format::SourceFormat;
pub use pdf::{PdfMode, STAMP_TEXT, reflow_pdf_text, restamp_pdf, write_pdf};
pub use publication::{PublicationFields, format_publication};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to parse PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("failed to read DOCX package: {0}")]
    Package(#[from] zip::result::ZipError),
    #[error("failed to parse DOCX XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("failed to rewrite DOCX XML: {0}")]
    Markup(#[from] quick_xml::Error),
    #[error("unsupported document: {0}")]
    Unsupported(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options that apply to every conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    pub docx_mode: DocxMode,
    pub pdf_mode: PdfMode,
}

/// Convert `input` (declared as `format`) into the output document at `output`.
///
/// Blocking: callers on an async runtime should run this on the blocking pool.
/// `output` is created or truncated.
pub fn convert(
    format: SourceFormat,
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<(), ConvertError> {
    tracing::debug!(
        ?format,
        input = %input.display(),
        output = %output.display(),
        "converting"
    );
    match format {
        SourceFormat::Docx => write_docx(input, output, options.docx_mode),
        SourceFormat::Pdf => write_pdf(input, output, options.pdf_mode),
    }
}

use std::path::Path;

/// The source formats the converter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Docx,
    Pdf,
}

impl SourceFormat {
    /// Classify an uploaded filename by its extension (case-insensitive).
    ///
    /// Dotfiles such as `.docx` have no extension and are not classified.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Canonical lowercase extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_supported_extensions() {
        assert_eq!(SourceFormat::from_filename("thesis.docx"), Some(SourceFormat::Docx));
        assert_eq!(SourceFormat::from_filename("paper.pdf"), Some(SourceFormat::Pdf));
    }

    #[test]
    fn extension_match_ignores_case() {
        assert_eq!(SourceFormat::from_filename("SCAN.PDF"), Some(SourceFormat::Pdf));
        assert_eq!(SourceFormat::from_filename("Report.DocX"), Some(SourceFormat::Docx));
    }

    #[test]
    fn only_last_extension_counts() {
        assert_eq!(SourceFormat::from_filename("notes.pdf.txt"), None);
        assert_eq!(SourceFormat::from_filename("notes.txt.pdf"), Some(SourceFormat::Pdf));
    }

    #[test]
    fn rejects_unsupported_and_missing_extensions() {
        assert_eq!(SourceFormat::from_filename("sheet.xlsx"), None);
        assert_eq!(SourceFormat::from_filename("legacy.doc"), None);
        assert_eq!(SourceFormat::from_filename("README"), None);
        assert_eq!(SourceFormat::from_filename(".docx"), None);
        assert_eq!(SourceFormat::from_filename(""), None);
    }

    #[test]
    fn extension_is_lowercase() {
        assert_eq!(SourceFormat::Docx.extension(), "docx");
        assert_eq!(SourceFormat::Pdf.extension(), "pdf");
    }
}

use std::path::PathBuf;

use docfmt_core::ConvertOptions;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub upload_dir: PathBuf,
    pub convert: ConvertOptions,
}

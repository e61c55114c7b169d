//! HTTP front end for the docfmt converters.
//!
//! - `POST /upload` takes a multipart body with one `file` field (`.docx` or
//!   `.pdf`) and answers with the converted document as `formatted.pdf`.
//! - `POST /process` takes a `.docx` manuscript plus the journal details as
//!   form fields and answers with `formatted_publication.docx`.
//! - Any other `GET` path is served from the public directory.
//!
//! ```bash
//! curl -F "file=@paper.pdf" -o formatted.pdf http://localhost:3000/upload
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod upload;

pub use config::ServerConfig;
pub use error::UploadError;
pub use server::{create_router, serve};

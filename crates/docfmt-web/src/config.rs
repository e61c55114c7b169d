use std::path::{Path, PathBuf};

use docfmt_core::{ConvertOptions, DocxMode, PdfMode};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: Option<ServerSection>,
    pub conversion: Option<ConversionSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub upload_dir: Option<String>,
    pub public_dir: Option<String>,
    pub max_upload_mb: Option<usize>,
    pub cors_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionSection {
    pub docx_mode: Option<DocxMode>,
    pub pdf_mode: Option<PdfMode>,
}

/// Platform config directory path: `<config_dir>/docfmt/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docfmt").join("config.toml"))
}

/// Load config by cascading CWD `.docfmt.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".docfmt.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            Some(config)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_server = base.server.unwrap_or_default();
    let over_server = overlay.server.unwrap_or_default();
    let base_conversion = base.conversion.unwrap_or_default();
    let over_conversion = overlay.conversion.unwrap_or_default();

    ConfigFile {
        server: Some(ServerSection {
            host: over_server.host.or(base_server.host),
            port: over_server.port.or(base_server.port),
            upload_dir: over_server.upload_dir.or(base_server.upload_dir),
            public_dir: over_server.public_dir.or(base_server.public_dir),
            max_upload_mb: over_server.max_upload_mb.or(base_server.max_upload_mb),
            cors_origins: over_server.cors_origins.or(base_server.cors_origins),
        }),
        conversion: Some(ConversionSection {
            docx_mode: over_conversion.docx_mode.or(base_conversion.docx_mode),
            pdf_mode: over_conversion.pdf_mode.or(base_conversion.pdf_mode),
        }),
    }
}

/// Resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Parent directory for per-request upload workspaces.
    pub upload_dir: PathBuf,
    /// Directory served verbatim for GET requests.
    pub public_dir: PathBuf,
    pub max_upload_mb: usize,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    pub convert: ConvertOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("uploads"),
            public_dir: PathBuf::from("public"),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            cors_origins: Vec::new(),
            convert: ConvertOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Resolve config from env vars > config files > defaults.
    pub fn load() -> Self {
        let mut config = Self::from_file(&load_config());
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(file: &ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(server) = &file.server {
            if let Some(host) = &server.host {
                config.host = host.clone();
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(dir) = &server.upload_dir {
                config.upload_dir = PathBuf::from(dir);
            }
            if let Some(dir) = &server.public_dir {
                config.public_dir = PathBuf::from(dir);
            }
            if let Some(mb) = server.max_upload_mb {
                config.max_upload_mb = mb;
            }
            if let Some(origins) = &server.cors_origins {
                config.cors_origins = origins.clone();
            }
        }
        if let Some(conversion) = &file.conversion {
            if let Some(mode) = conversion.docx_mode {
                config.convert.docx_mode = mode;
            }
            if let Some(mode) = conversion.pdf_mode {
                config.convert.pdf_mode = mode;
            }
        }

        config
    }

    /// Override settings from `DOCFMT_*` variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DOCFMT_HOST") {
            self.host = host;
        }
        if let Some(port) = parse_env(&lookup, "DOCFMT_PORT") {
            self.port = port;
        }
        if let Some(dir) = lookup("DOCFMT_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DOCFMT_PUBLIC_DIR") {
            self.public_dir = PathBuf::from(dir);
        }
        if let Some(mb) = parse_env::<usize, _>(&lookup, "DOCFMT_MAX_UPLOAD_MB") {
            if mb > 0 {
                self.max_upload_mb = mb;
            } else {
                tracing::warn!("Invalid DOCFMT_MAX_UPLOAD_MB value (must be > 0)");
            }
        }
        if let Some(origins) = lookup("DOCFMT_CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(mode) = parse_env(&lookup, "DOCFMT_DOCX_MODE") {
            self.convert.docx_mode = mode;
        }
        if let Some(mode) = parse_env(&lookup, "DOCFMT_PDF_MODE") {
            self.convert.pdf_mode = mode;
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Failed to parse {key}='{value}': {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_serve_from_local_directories() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.public_dir, PathBuf::from("public"));
        assert_eq!(config.convert.docx_mode, DocxMode::Raw);
        assert_eq!(config.convert.pdf_mode, PdfMode::Stamp);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn toml_sections_apply() {
        let toml_str = r#"
[server]
port = 8080
upload_dir = "/var/tmp/docfmt"
cors_origins = ["https://example.com"]

[conversion]
docx_mode = "paragraphs"
pdf_mode = "text"
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let config = ServerConfig::from_file(&file);
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_dir, PathBuf::from("/var/tmp/docfmt"));
        assert_eq!(config.public_dir, PathBuf::from("public"));
        assert_eq!(config.cors_origins, vec!["https://example.com".to_string()]);
        assert_eq!(config.convert.docx_mode, DocxMode::Paragraphs);
        assert_eq!(config.convert.pdf_mode, PdfMode::Text);
    }

    #[test]
    fn merge_overlay_wins_and_base_fills_gaps() {
        let base = ConfigFile {
            server: Some(ServerSection {
                port: Some(4000),
                public_dir: Some("/srv/public".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            server: Some(ServerSection {
                port: Some(5000),
                ..Default::default()
            }),
            conversion: Some(ConversionSection {
                docx_mode: Some(DocxMode::Paragraphs),
                pdf_mode: None,
            }),
        };
        let base = ConfigFile {
            conversion: Some(ConversionSection {
                pdf_mode: Some(PdfMode::Text),
                ..Default::default()
            }),
            ..base
        };
        let merged = merge(base, overlay);
        let server = merged.server.unwrap();
        assert_eq!(server.port, Some(5000));
        assert_eq!(server.public_dir.as_deref(), Some("/srv/public"));
        let conversion = merged.conversion.unwrap();
        assert_eq!(conversion.docx_mode, Some(DocxMode::Paragraphs));
        assert_eq!(conversion.pdf_mode, Some(PdfMode::Text));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ServerConfig::default();
        config.apply_env(env(&[
            ("DOCFMT_PORT", "9001"),
            ("DOCFMT_UPLOAD_DIR", "/tmp/up"),
            ("DOCFMT_CORS_ORIGINS", "https://a.example, ,https://b.example"),
            ("DOCFMT_DOCX_MODE", "paragraphs"),
            ("DOCFMT_PDF_MODE", "TEXT"),
            ("DOCFMT_MAX_UPLOAD_MB", "5"),
        ]));
        assert_eq!(config.port, 9001);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.convert.docx_mode, DocxMode::Paragraphs);
        assert_eq!(config.convert.pdf_mode, PdfMode::Text);
        assert_eq!(config.max_upload_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env(env(&[
            ("DOCFMT_PORT", "eighty"),
            ("DOCFMT_MAX_UPLOAD_MB", "0"),
            ("DOCFMT_DOCX_MODE", "html"),
            ("DOCFMT_PDF_MODE", "ocr"),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_upload_mb, DEFAULT_MAX_UPLOAD_MB);
        assert_eq!(config.convert.docx_mode, DocxMode::Raw);
        assert_eq!(config.convert.pdf_mode, PdfMode::Stamp);
    }

    #[test]
    fn unparseable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(load_from_path(&path).is_none());
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());
    }
}

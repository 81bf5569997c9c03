//! Application configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! addr = "127.0.0.1:3000"
//! app_root = "app"
//! extensions = ["rs"]
//! dev_mode = true
//! debounce_ms = 150
//! client_script = "/_trellis/client.js"
//! title = "My App"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the live connection server binds.
    pub addr: SocketAddr,
    /// Directory scanned for page, layout and API artifacts.
    pub app_root: PathBuf,
    /// File extensions that count as artifacts.
    pub extensions: Vec<String>,
    /// Watch `app_root` and reload clients on change.
    pub dev_mode: bool,
    /// Quiet period before a burst of file events triggers a rebuild.
    pub debounce_ms: u64,
    /// Script the document shell loads to open the live connection.
    pub client_script: String,
    /// Document title.
    pub title: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            app_root: PathBuf::from("app"),
            extensions: vec!["rs".into()],
            dev_mode: false,
            debounce_ms: 150,
            client_script: "/_trellis/client.js".into(),
            title: "Trellis".into(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            return Err(Error::Config("`extensions` must not be empty".into()));
        }
        if let Some(ext) = self.extensions.iter().find(|ext| ext.starts_with('.')) {
            return Err(Error::Config(format!(
                "extension `{ext}` must be given without a leading dot"
            )));
        }
        Ok(())
    }
}

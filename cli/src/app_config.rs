//! Config file as the CLI reads it: the engine config plus logging.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use chainflow_core::config::ChainflowConfig;
use chainflow_observability::{init_tracing, LogConfig};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub chainflow: ChainflowConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)
                .with_context(|| format!("parsing JSON config '{}'", path.display()))?,
            _ => serde_yaml::from_str(&text)
                .with_context(|| format!("parsing YAML config '{}'", path.display()))?,
        };
        Ok(config)
    }

    /// Directory that relative ABI paths resolve against.
    pub fn base_dir(path: &Path) -> PathBuf {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn init_logging(&self, verbose: bool) {
        let mut log = self.log.clone();
        if verbose {
            log.level = "debug".into();
        }
        // a subscriber may already be installed; keep it
        let _ = init_tracing(&log);
    }
}

//! Project configuration: networks, sources, and engine settings.
//!
//! Loaded from YAML or JSON. [`ChainflowConfig::build_sources`] turns the
//! declarative form into the [`Source`] list a generation runs with.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::abi::AbiIndex;
use crate::error::ConfigError;
use crate::source::{AddressFilter, FilterKind, Network, Source, SourceKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainflowConfig {
    /// network name → chain settings
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub name: String,
    pub network: String,
    #[serde(default = "default_kind")]
    pub kind: FilterKind,
    /// Contract addresses; empty matches every contract.
    #[serde(default, alias = "address")]
    pub addresses: Vec<Address>,
    /// Path to an ABI JSON file (relative to the config file) or the ABI inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<AbiSource>,
    #[serde(default)]
    pub start_block: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_block: Option<u64>,
    /// Block sources only: every Nth block.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub include_transaction_receipts: bool,
}

/// Inline ABIs are kept as JSON and parsed when sources are built, so YAML
/// and JSON configs go through the same ABI parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AbiSource {
    Path(PathBuf),
    Inline(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Decode worker threads. `None` = one per CPU core.
    #[serde(default)]
    pub decode_workers: Option<usize>,
    /// Capacity of the progress broadcast channel.
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decode_workers: None,
            progress_capacity: default_progress_capacity(),
        }
    }
}

fn default_kind() -> FilterKind {
    FilterKind::Log
}
fn default_interval() -> u64 {
    1
}
fn default_progress_capacity() -> usize {
    1_024
}

impl ChainflowConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file. Unknown extensions are read as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_file(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Structural checks that need no file access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }
            if !self.networks.contains_key(&source.network) {
                return Err(ConfigError::UnknownNetwork {
                    source_name: source.name.clone(),
                    network: source.network.clone(),
                });
            }
            if let Some(end) = source.end_block {
                if end < source.start_block {
                    return Err(ConfigError::InvalidBlockRange {
                        source_name: source.name.clone(),
                        start: source.start_block,
                        end,
                    });
                }
            }
            match source.kind {
                FilterKind::Block => {
                    if source.interval == 0 {
                        return Err(ConfigError::ZeroInterval(source.name.clone()));
                    }
                }
                FilterKind::Log | FilterKind::CallTrace => {
                    if source.abi.is_none() {
                        return Err(ConfigError::MissingAbi {
                            source_name: source.name.clone(),
                            kind: source.kind.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate and resolve into sources. ABI paths are relative to `base_dir`.
    pub fn build_sources(&self, base_dir: &Path) -> Result<Vec<Source>, ConfigError> {
        self.validate()?;

        let mut sources = Vec::with_capacity(self.sources.len());
        for cfg in &self.sources {
            let chain_id = self
                .networks
                .get(&cfg.network)
                .map(|n| n.chain_id)
                .ok_or_else(|| ConfigError::UnknownNetwork {
                    source_name: cfg.name.clone(),
                    network: cfg.network.clone(),
                })?;
            let network = Network::new(cfg.network.clone(), chain_id);

            let kind = match cfg.kind {
                FilterKind::Block => SourceKind::Block {
                    interval: cfg.interval,
                },
                FilterKind::Log | FilterKind::CallTrace => {
                    let abi = Arc::new(load_abi(cfg, base_dir)?);
                    for name in abi.overloaded() {
                        warn!(
                            source = %cfg.name,
                            name = %name,
                            "overloaded ABI item is not supported; its events will be ignored"
                        );
                    }
                    let address = if cfg.addresses.is_empty() {
                        AddressFilter::Any
                    } else {
                        AddressFilter::Exact(cfg.addresses.clone())
                    };
                    let include_transaction_receipts = cfg.include_transaction_receipts;
                    if cfg.kind == FilterKind::Log {
                        SourceKind::Log {
                            address,
                            abi,
                            include_transaction_receipts,
                        }
                    } else {
                        SourceKind::CallTrace {
                            address,
                            abi,
                            include_transaction_receipts,
                        }
                    }
                }
            };

            sources.push(Source {
                name: cfg.name.clone(),
                network,
                start_block: cfg.start_block,
                end_block: cfg.end_block,
                kind,
            });
        }
        Ok(sources)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn load_abi(cfg: &SourceConfig, base_dir: &Path) -> Result<AbiIndex, ConfigError> {
    let text = match &cfg.abi {
        Some(AbiSource::Inline(value)) => value.to_string(),
        Some(AbiSource::Path(path)) => read_file(&base_dir.join(path))?,
        None => {
            return Err(ConfigError::MissingAbi {
                source_name: cfg.name.clone(),
                kind: cfg.kind.to_string(),
            })
        }
    };
    let abi = serde_json::from_str::<JsonAbi>(&text).map_err(|e| ConfigError::InvalidAbi {
        source_name: cfg.name.clone(),
        reason: e.to_string(),
    })?;
    Ok(AbiIndex::new(&abi))
}

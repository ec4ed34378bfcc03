//! Pipeline configuration
//!
//! Loaded from TOML. All values are deployment parameters, fixed once the
//! pipeline is opened.
//!
//! ```toml
//! pipeline_id = "rep-audit-1"
//! data_dir = "/var/lib/cairn"
//! durability = "strict"
//! dedup = "durable"
//!
//! [signing]
//! scheme = "ed25519"
//! key_path = "/etc/cairn/signing.key"
//! ```

use crate::error::{EngineError, Result};
use cairn_core::SUPPORTED_SCHEMA_VERSIONS;
use cairn_durability::DurabilityMode;
use cairn_security::SignatureScheme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default pipeline version stamped into lineage
pub const DEFAULT_PIPELINE_VERSION: &str = "1.0.0";

/// Default downstream target
pub const DEFAULT_DOWNSTREAM_URI: &str = "system://downstream";

/// Where the dedup set lives
///
/// `Memory` loses the set on restart: a record re-ingested after a restart is
/// processed again. `Durable` journals every accepted key under `data_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupBacking {
    /// Process-local set
    #[default]
    Memory,
    /// Journaled to `dedup.log`
    Durable,
}

/// Signing configuration; the scheme has no default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// Signature scheme
    pub scheme: SignatureScheme,
    /// Key file (created on first open if missing)
    pub key_path: PathBuf,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline identifier
    pub pipeline_id: String,
    /// Pipeline version stamped into lineage
    #[serde(default = "default_pipeline_version")]
    pub pipeline_version: String,
    /// Schema version records are validated against
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Processing node id; defaults to `pipeline_id`
    #[serde(default)]
    pub node_id: Option<String>,
    /// Downstream publish target
    #[serde(default = "default_downstream_uri")]
    pub downstream_uri: String,
    /// State directory; ephemeral pipeline when absent
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// fsync policy for the logs
    #[serde(default)]
    pub durability: DurabilityMode,
    /// Dedup set backing
    #[serde(default)]
    pub dedup: DedupBacking,
    /// Checkpoint signing
    pub signing: SigningConfig,
}

fn default_pipeline_version() -> String {
    DEFAULT_PIPELINE_VERSION.to_string()
}

fn default_schema_version() -> String {
    cairn_core::SCHEMA_VERSION.to_string()
}

fn default_downstream_uri() -> String {
    DEFAULT_DOWNSTREAM_URI.to_string()
}

impl PipelineConfig {
    /// Minimal config with defaults for everything optional
    pub fn new(pipeline_id: impl Into<String>, signing: SigningConfig) -> Self {
        PipelineConfig {
            pipeline_id: pipeline_id.into(),
            pipeline_version: default_pipeline_version(),
            schema_version: default_schema_version(),
            node_id: None,
            downstream_uri: default_downstream_uri(),
            data_dir: None,
            durability: DurabilityMode::default(),
            dedup: DedupBacking::default(),
            signing,
        }
    }

    /// Parse from TOML text and validate
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_id.trim().is_empty() {
            return Err(EngineError::Config("pipeline_id must not be empty".into()));
        }
        if self.pipeline_version.trim().is_empty() {
            return Err(EngineError::Config("pipeline_version must not be empty".into()));
        }
        if matches!(&self.node_id, Some(id) if id.trim().is_empty()) {
            return Err(EngineError::Config("node_id must not be empty".into()));
        }
        if self.downstream_uri.trim().is_empty() {
            return Err(EngineError::Config("downstream_uri must not be empty".into()));
        }
        if !SUPPORTED_SCHEMA_VERSIONS.contains(&self.schema_version.as_str()) {
            return Err(EngineError::Config(format!(
                "unknown schema_version '{}'",
                self.schema_version
            )));
        }
        if self.dedup == DedupBacking::Durable && self.data_dir.is_none() {
            return Err(EngineError::Config(
                "dedup = \"durable\" requires data_dir".into(),
            ));
        }
        if self.signing.key_path.as_os_str().is_empty() {
            return Err(EngineError::Config("signing.key_path must not be empty".into()));
        }
        Ok(())
    }

    /// Effective processing node id
    pub fn node_id(&self) -> &str {
        self.node_id.as_deref().unwrap_or(&self.pipeline_id)
    }

    /// Whether state lives only in memory
    pub fn is_ephemeral(&self) -> bool {
        self.data_dir.is_none()
    }

    /// Builder-style: set the state directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Builder-style: set dedup backing
    pub fn with_dedup(mut self, dedup: DedupBacking) -> Self {
        self.dedup = dedup;
        self
    }

    /// Builder-style: set durability mode
    pub fn with_durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }
}

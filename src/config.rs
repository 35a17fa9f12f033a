//! YAML configuration for a FaceAuth deployment.
//!
//! One file describes where state is persisted, how the embedding index is
//! laid out, and the decision thresholds:
//!
//! ```yaml
//! version: "1.0"
//! name: "kiosk-eu-1"
//!
//! storage:
//!   backend: "redb"            # or "in_memory"
//!   path: "/var/lib/faceauth/faceauth.redb"
//!
//! index:
//!   dimension: 512
//!   metric: "cosine"           # or "euclidean"
//!   compression: "zstd"        # or "none"
//!   compression_level: 3
//!   ann:
//!     enabled: false
//!     m: 16
//!     ef_construction: 200
//!     ef_search: 50
//!     min_vectors_for_ann: 1000
//!
//! auth:
//!   similarity_threshold: 0.6
//!   max_distance: 1.0
//!   min_liveness_confidence: 0.0
//!
//! commitment:
//!   salt_bytes: 16
//!
//! logging:
//!   level: "info"
//!   json: false
//! ```
//!
//! Two environment variables override the file after loading:
//! `FACEAUTH_SIM_THRESHOLD` (cosine threshold) and `FACEAUTH_DATA_PATH`
//! (switches storage to redb at that path).

use std::fs;
use std::path::{Path, PathBuf};

use commitment::CommitmentBuilder;
use engine::AuthConfig;
use index::{AnnConfig, CompressionCodec, CompressionConfig, IndexConfig, Metric};
use serde::{Deserialize, Serialize};
use store::BackendConfig;
use thiserror::Error;

/// Environment variable overriding `auth.similarity_threshold`.
pub const ENV_SIM_THRESHOLD: &str = "FACEAUTH_SIM_THRESHOLD";
/// Environment variable overriding `storage` with a redb file path.
pub const ENV_DATA_PATH: &str = "FACEAUTH_DATA_PATH";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FaceAuthConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub storage: StorageYamlConfig,

    #[serde(default)]
    pub index: IndexYamlConfig,

    #[serde(default)]
    pub auth: AuthYamlConfig,

    #[serde(default)]
    pub commitment: CommitmentYamlConfig,

    #[serde(default)]
    pub logging: LoggingYamlConfig,
}

impl FaceAuthConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: FaceAuthConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FACEAUTH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigLoadError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests), then re-validate.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SIM_THRESHOLD) {
            self.auth.similarity_threshold = raw.trim().parse().map_err(|_| {
                ConfigLoadError::Validation(format!("{ENV_SIM_THRESHOLD} is not a number: {raw}"))
            })?;
        }
        if let Some(path) = lookup(ENV_DATA_PATH) {
            if !path.trim().is_empty() {
                self.storage = StorageYamlConfig {
                    backend: "redb".to_string(),
                    path: Some(PathBuf::from(path.trim())),
                };
            }
        }
        self.validate()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.storage.validate()?;
        self.index.validate()?;
        self.auth.validate()?;
        self.commitment.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    pub fn backend_config(&self) -> BackendConfig {
        match (&*self.storage.backend, &self.storage.path) {
            ("redb", Some(path)) => BackendConfig::redb(path.clone()),
            _ => BackendConfig::in_memory(),
        }
    }

    pub fn index_config(&self) -> IndexConfig {
        let ann = AnnConfig::default()
            .with_enabled(self.index.ann.enabled)
            .with_m(self.index.ann.m)
            .with_ef_construction(self.index.ann.ef_construction)
            .with_ef_search(self.index.ann.ef_search)
            .with_min_vectors_for_ann(self.index.ann.min_vectors_for_ann);
        IndexConfig::new()
            .with_dimension(self.index.dimension)
            .with_metric(self.index.metric)
            .with_compression(CompressionConfig::new(
                self.index.compression,
                self.index.compression_level,
            ))
            .with_ann(ann)
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_similarity_threshold(self.auth.similarity_threshold)
            .with_max_distance(self.auth.max_distance)
            .with_min_liveness_confidence(self.auth.min_liveness_confidence)
    }

    pub fn commitment_builder(&self) -> CommitmentBuilder {
        CommitmentBuilder::new().with_salt_bytes(self.commitment.salt_bytes)
    }
}

impl Default for FaceAuthConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            storage: StorageYamlConfig::default(),
            index: IndexYamlConfig::default(),
            auth: AuthYamlConfig::default(),
            commitment: CommitmentYamlConfig::default(),
            logging: LoggingYamlConfig::default(),
        }
    }
}

/// Persistence backend YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "storage.backend must be one of: {valid_backends:?}"
            )));
        }

        if self.backend == "redb" && self.path.is_none() {
            return Err(ConfigLoadError::Validation(
                "storage.path is required when backend is 'redb'".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for StorageYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

/// Embedding index YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub metric: Metric,

    #[serde(default)]
    pub compression: CompressionCodec,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    #[serde(default)]
    pub ann: AnnYamlConfig,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.dimension == 0 {
            return Err(ConfigLoadError::Validation(
                "index.dimension must be >= 1".to_string(),
            ));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(
                "index.compression_level must be between 1 and 22".to_string(),
            ));
        }
        if self.ann.m == 0 {
            return Err(ConfigLoadError::Validation(
                "index.ann.m must be >= 1".to_string(),
            ));
        }
        if self.ann.ef_search == 0 {
            return Err(ConfigLoadError::Validation(
                "index.ann.ef_search must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            metric: Metric::default(),
            compression: CompressionCodec::default(),
            compression_level: default_compression_level(),
            ann: AnnYamlConfig::default(),
        }
    }
}

/// HNSW YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnYamlConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_ann_m")]
    pub m: usize,

    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    #[serde(default = "default_min_vectors_for_ann")]
    pub min_vectors_for_ann: usize,
}

impl Default for AnnYamlConfig {
    fn default() -> Self {
        let ann = AnnConfig::default();
        Self {
            enabled: ann.enabled,
            m: ann.m,
            ef_construction: ann.ef_construction,
            ef_search: ann.ef_search,
            min_vectors_for_ann: ann.min_vectors_for_ann,
        }
    }
}

/// Decision threshold YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthYamlConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_max_distance")]
    pub max_distance: f32,

    #[serde(default)]
    pub min_liveness_confidence: f32,
}

impl AuthYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        AuthConfig::new()
            .with_similarity_threshold(self.similarity_threshold)
            .with_max_distance(self.max_distance)
            .with_min_liveness_confidence(self.min_liveness_confidence)
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("auth: {e}")))
    }
}

impl Default for AuthYamlConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_distance: default_max_distance(),
            min_liveness_confidence: 0.0,
        }
    }
}

/// Commitment YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentYamlConfig {
    #[serde(default = "default_salt_bytes")]
    pub salt_bytes: usize,
}

impl CommitmentYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.salt_bytes < 8 {
            return Err(ConfigLoadError::Validation(
                "commitment.salt_bytes must be >= 8".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CommitmentYamlConfig {
    fn default() -> Self {
        Self {
            salt_bytes: default_salt_bytes(),
        }
    }
}

/// Logging YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingYamlConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl LoggingYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Helper functions for serde defaults
fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_dimension() -> usize {
    index::DEFAULT_DIMENSION
}
fn default_compression_level() -> i32 {
    3
}
fn default_ann_m() -> usize {
    16
}
fn default_ef_construction() -> usize {
    200
}
fn default_ef_search() -> usize {
    50
}
fn default_min_vectors_for_ann() -> usize {
    1000
}
fn default_similarity_threshold() -> f32 {
    0.6
}
fn default_max_distance() -> f32 {
    1.0
}
fn default_salt_bytes() -> usize {
    commitment::DEFAULT_SALT_BYTES
}
fn default_log_level() -> String {
    "info".to_string()
}

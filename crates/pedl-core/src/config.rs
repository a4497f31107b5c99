//! PEDL Configuration Management
//!
//! Handles configuration from environment variables, config files,
//! and command-line arguments. Defaults reproduce the published PEDL settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Scoring service configuration
    pub scoring: ScoringConfig,

    /// Evidence retrieval configuration
    pub evidence: EvidenceConfig,

    /// Extraction (predict) configuration
    pub extraction: ExtractionConfig,

    /// Training-set crawl configuration
    pub crawl: CrawlConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Scoring service
        if let Ok(url) = std::env::var("PEDL_SCORING_URL") {
            self.scoring.base_url = url;
        }
        if let Ok(model) = std::env::var("PEDL_MODEL") {
            self.scoring.model = model;
        }
        if let Ok(size) = std::env::var("PEDL_BATCH_SIZE") {
            self.scoring.batch_size = parse_env("PEDL_BATCH_SIZE", size)?;
        }
        if let Ok(pooling) = std::env::var("PEDL_POOLING") {
            self.scoring.pooling = pooling.parse()?;
        }

        // Evidence
        if let Ok(path) = std::env::var("PEDL_PUBTATOR") {
            self.evidence.pubtator = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("PEDL_EVIDENCE_URL") {
            self.evidence.remote_url = url;
        }
        if let Ok(path) = std::env::var("PEDL_GENE_TABLE") {
            self.evidence.gene_table = Some(PathBuf::from(path));
        }
        if let Ok(flag) = std::env::var("PEDL_API_FALLBACK") {
            self.evidence.api_fallback = parse_env("PEDL_API_FALLBACK", flag)?;
        }

        // Extraction
        if let Ok(cutoff) = std::env::var("PEDL_CUTOFF") {
            self.extraction.cutoff = parse_env("PEDL_CUTOFF", cutoff)?;
        }

        // Logging
        if let Ok(level) = std::env::var("PEDL_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Scoring service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Base URL of the model-serving endpoint
    pub base_url: String,

    /// Model identifier passed to the service
    pub model: String,

    /// Sentences per request (0 sends everything in one request)
    pub batch_size: usize,

    /// Maximum token length per sentence
    pub max_length: usize,

    /// Bag pooling the service applies across sentences
    pub pooling: Pooling,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8500".to_string(),
            model: "leonweber/PEDL".to_string(),
            batch_size: 50,
            max_length: 512,
            pooling: Pooling::LogSumExp,
            timeout_secs: 300,
        }
    }
}

/// Pooling of sentence logits into one bag-level score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    Max,
    LogSumExp,
}

impl std::str::FromStr for Pooling {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "logsumexp" => Ok(Self::LogSumExp),
            _ => Err(ConfigError::InvalidValue {
                key: "PEDL_POOLING".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Evidence retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Local PubTator file or directory; remote-only mode when unset
    pub pubtator: Option<PathBuf>,

    /// Remote evidence service URL
    pub remote_url: String,

    /// TSV of `gene_id<TAB>symbol` used for name resolution
    pub gene_table: Option<PathBuf>,

    /// Co-mention PMIDs fetched per sentence batch
    pub pmids_per_batch: usize,

    /// Ask the remote service for PMIDs and documents the local
    /// PubTator copy lacks
    pub api_fallback: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            pubtator: None,
            remote_url: "http://localhost:8600".to_string(),
            gene_table: None,
            pmids_per_batch: 100,
            api_fallback: false,
            timeout_secs: 60,
        }
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum probability for an extraction record
    pub cutoff: f64,

    /// Do not query (p2, p1) for every (p1, p2)
    pub skip_reverse: bool,

    /// Maximum number of pairs in remote-only mode
    pub max_remote_pairs: usize,

    /// Emission policy for cells sharing a score
    pub tie_policy: TiePolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            cutoff: 0.01,
            skip_reverse: false,
            max_remote_pairs: 100,
            tie_policy: TiePolicy::Literal,
        }
    }
}

/// How the ranker treats cells with exactly equal scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Every occurrence of a score in the sorted walk emits all cells with that score
    #[default]
    Literal,
    /// Each cell is emitted exactly once
    EmitOnce,
}

impl std::str::FromStr for TiePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "literal" => Ok(Self::Literal),
            "emit_once" | "once" => Ok(Self::EmitOnce),
            _ => Err(ConfigError::InvalidValue {
                key: "tie_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Aggregate the summary cutoff is applied to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryAggregate {
    #[default]
    Sum,
    Max,
}

impl std::str::FromStr for SummaryAggregate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "max" => Ok(Self::Max),
            _ => Err(ConfigError::InvalidValue {
                key: "aggregate".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Training-set crawl configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Total number of workers
    pub n_worker: usize,

    /// Index of this worker in `0..n_worker`
    pub worker_id: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            n_worker: 1,
            worker_id: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

//! PEDL Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the PEDL pipeline:
//! - Biomedical entities and ordered entity pairs
//! - Evidence (documents, annotations, sentences)
//! - The fixed relation label vocabulary and score matrices
//! - Extraction and training records with their line formats
//! - Common error types
//! - Collaborator traits (evidence retrieval, sentence scoring)
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, CrawlConfig, EvidenceConfig, ExtractionConfig, LoggingConfig,
    Pooling, ScoringConfig, SummaryAggregate, TiePolicy,
};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for PEDL operations
#[derive(Error, Debug)]
pub enum PedlError {
    #[error("{0} is neither a valid gene symbol nor a canonical entity id")]
    UnresolvedEntity(String),

    #[error(
        "Using PEDL without a local PubTator copy is only supported for small queries up to \
         {limit} pairs. Your query contains {count} pairs."
    )]
    OversizedRemoteQuery { count: usize, limit: usize },

    #[error("Evidence unavailable: {0}")]
    EvidenceUnavailable(String),

    #[error("Malformed training triple on line {line}: {reason}")]
    MalformedTriple { line: usize, reason: String },

    #[error("Invalid shard: worker {worker_id} of {n_worker}")]
    InvalidShard { worker_id: usize, n_worker: usize },

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PedlError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PedlError>;

// ============================================================================
// Entities
// ============================================================================

/// Kind of a biomedical entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Gene,
    Chemical,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gene => "Gene",
            Self::Chemical => "Chemical",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = PedlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Gene" => Ok(Self::Gene),
            "Chemical" => Ok(Self::Chemical),
            other => Err(PedlError::InvalidInput(format!(
                "unknown entity type '{other}'"
            ))),
        }
    }
}

/// A canonical biomedical entity (NCBI gene id, MeSH/ChEBI chemical id)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn gene(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Gene, id)
    }

    pub fn chemical(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Chemical, id)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// An ordered (head, tail) pair; direction matters
///
/// Self-pairs cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityPair {
    head: Entity,
    tail: Entity,
}

impl EntityPair {
    /// Create a pair, or `None` if head and tail are the same entity
    pub fn new(head: Entity, tail: Entity) -> Option<Self> {
        if head == tail {
            return None;
        }
        Some(Self { head, tail })
    }

    pub fn head(&self) -> &Entity {
        &self.head
    }

    pub fn tail(&self) -> &Entity {
        &self.tail
    }

    /// The same pair with head and tail swapped
    pub fn reversed(&self) -> Self {
        Self {
            head: self.tail.clone(),
            tail: self.head.clone(),
        }
    }
}

impl std::fmt::Display for EntityPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.head, self.tail)
    }
}

// ============================================================================
// Evidence
// ============================================================================

/// An entity mention inside a document
///
/// Offsets are character (not byte) offsets into `Document::text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub start: usize,
    pub end: usize,
    pub mention: String,
    pub kind: EntityKind,
    pub ids: Vec<String>,
}

impl Annotation {
    /// Whether this mention is annotated with the given entity
    pub fn refers_to(&self, entity: &Entity) -> bool {
        self.kind == entity.kind && self.ids.iter().any(|id| *id == entity.id)
    }
}

/// A document (title and abstract) with its entity annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pmid: String,
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Document {
    /// Whether any annotation in the document refers to the entity
    pub fn mentions(&self, entity: &Entity) -> bool {
        self.annotations.iter().any(|a| a.refers_to(entity))
    }
}

/// A sentence co-mentioning an entity pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sentence {
    /// Raw sentence text
    pub text: String,
    /// Text with entity mentions replaced by placeholder tokens
    pub text_blinded: String,
    pub pmid: String,
}

// ============================================================================
// Relation labels and scores
// ============================================================================

/// Number of relation labels scored by the model
pub const NUM_LABELS: usize = 7;

/// Relation types, index-aligned with the scoring model's output columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationLabel {
    ControlsStateChangeOf,
    ControlsTransportOf,
    ControlsPhosphorylationOf,
    ControlsExpressionOf,
    CatalysisPrecedes,
    InComplexWith,
    InteractsWith,
}

impl RelationLabel {
    /// All labels in model column order
    pub const ALL: [RelationLabel; NUM_LABELS] = [
        Self::ControlsStateChangeOf,
        Self::ControlsTransportOf,
        Self::ControlsPhosphorylationOf,
        Self::ControlsExpressionOf,
        Self::CatalysisPrecedes,
        Self::InComplexWith,
        Self::InteractsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlsStateChangeOf => "controls-state-change-of",
            Self::ControlsTransportOf => "controls-transport-of",
            Self::ControlsPhosphorylationOf => "controls-phosphorylation-of",
            Self::ControlsExpressionOf => "controls-expression-of",
            Self::CatalysisPrecedes => "catalysis-precedes",
            Self::InComplexWith => "in-complex-with",
            Self::InteractsWith => "interacts-with",
        }
    }

    /// Label for a model output column
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for RelationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentence x label probability matrix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreMatrix {
    rows: Vec<[f32; NUM_LABELS]>,
}

impl ScoreMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<[f32; NUM_LABELS]>) -> Self {
        Self { rows }
    }

    /// Append rows, keeping their order
    pub fn extend(&mut self, rows: impl IntoIterator<Item = [f32; NUM_LABELS]>) {
        self.rows.extend(rows);
    }

    pub fn rows(&self) -> &[[f32; NUM_LABELS]] {
        &self.rows
    }

    /// Number of sentences
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: usize, label: RelationLabel) -> Option<f32> {
        self.rows.get(row).map(|r| r[label.index()])
    }

    /// Whether every cell is strictly below the cutoff
    ///
    /// Cells are widened to f64 so that a decimal cutoff is not rounded
    /// to the nearest f32 first.
    pub fn all_below(&self, cutoff: f64) -> bool {
        self.rows.iter().flatten().all(|&v| f64::from(v) < cutoff)
    }
}

/// Raw model output for one batch of sentences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBatch {
    /// One row of logits per input sentence
    pub logits: Vec<[f32; NUM_LABELS]>,
    /// Bag-pooled logits over the batch, informational only
    #[serde(default)]
    pub bag_logits: Option<[f32; NUM_LABELS]>,
}

// ============================================================================
// Output records
// ============================================================================

/// Source tag for model-derived extraction records
pub const MODEL_SOURCE: &str = "PEDL";

/// One line of a per-pair extraction file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub label: String,
    pub score: f64,
    pub pmid: String,
    pub text: String,
    pub source: String,
}

impl ExtractionRecord {
    /// Serialize as `label\tscore\tpmid\ttext\tsource` followed by a blank line
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{:.2}\t{}\t{}\t{}\n\n",
            self.label, self.score, self.pmid, self.text, self.source
        )
    }

    /// Parse one non-empty line of a per-pair extraction file
    pub fn from_line(line: &str) -> Result<Self> {
        let mut fields = line.splitn(5, '\t');
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| PedlError::InvalidInput(format!("missing {name} in '{line}'")))
        };
        let label = next("label")?.to_string();
        let score = next("score")?;
        let score = score
            .trim()
            .parse::<f64>()
            .map_err(|_| PedlError::InvalidInput(format!("invalid score '{score}'")))?;
        let pmid = next("pmid")?.to_string();
        let text = next("text")?.to_string();
        let source = next("source")?.trim_end().to_string();

        Ok(Self {
            label,
            score,
            pmid,
            text,
            source,
        })
    }
}

/// One distantly supervised training example
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub head: Entity,
    pub tail: Entity,
    /// Sorted relation labels known for the pair
    pub relations: BTreeSet<String>,
    pub text: String,
    pub text_blinded: String,
    pub pmid: String,
}

impl TrainingRecord {
    fn line(&self, sentence: &str) -> String {
        let relations: Vec<&str> = self.relations.iter().map(String::as_str).collect();
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            self.head.kind,
            self.head.id,
            self.tail.kind,
            self.tail.id,
            relations.join(","),
            sentence,
            self.pmid
        )
    }

    /// Line for the raw-text corpus
    pub fn raw_line(&self) -> String {
        self.line(&self.text)
    }

    /// Line for the entity-blinded corpus
    pub fn blinded_line(&self) -> String {
        self.line(&self.text_blinded)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Source of co-mention evidence (local corpus or remote service)
#[async_trait::async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// PMIDs of documents mentioning the entity
    async fn get_pmids(&self, entity: &Entity) -> Result<BTreeSet<String>>;

    /// Documents for each requested PMID, in request order (empty if unavailable)
    async fn get_documents(&self, pmids: &[String]) -> Result<Vec<Vec<Document>>>;

    /// Sentences of one document co-mentioning head and tail
    fn get_sentences_from_document(
        &self,
        head: &Entity,
        tail: &Entity,
        document: &Document,
    ) -> Vec<Sentence>;

    /// Lazily fetched batches of sentences co-mentioning the pair
    fn get_sentences<'a>(&'a self, pair: &'a EntityPair) -> BoxStream<'a, Vec<Sentence>>;

    /// Whether evidence is served from a local copy of the corpus
    fn is_local(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Sentence-level relation scorer (the neural model behind a serving boundary)
#[async_trait::async_trait]
pub trait ScoringService: Send + Sync {
    /// Score a batch of entity-blinded sentences
    async fn score(&self, sentences_blinded: &[String]) -> Result<ScoredBatch>;
}

// ============================================================================
// Tests
// ============================================================================

//! Local PubTator store
//!
//! Loads PubTator-format annotation files into memory and serves
//! co-mention evidence from them.
//!
//! Format (one block per document, blocks separated by blank lines):
//!
//! ```text
//! 12345|t|Title text
//! 12345|a|Abstract text
//! 12345	0	4	TP53	Gene	7157
//! ```
//!
//! Annotation offsets are character offsets into `title + " " + abstract`.
//! Only `Gene` and `Chemical` annotations are kept.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;

use pedl_core::{
    Annotation, Document, Entity, EntityKind, EntityPair, EvidenceProvider, PedlError, Result,
    Sentence,
};

use crate::{sentences, stream_sentences};

/// Default number of co-mention PMIDs per sentence batch
pub const DEFAULT_PMIDS_PER_BATCH: usize = 100;

// ============================================================================
// Parsing
// ============================================================================

#[derive(Default)]
struct PartialDocument {
    pmid: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
    annotations: Vec<Annotation>,
}

impl PartialDocument {
    fn set_pmid(&mut self, pmid: &str, line_no: usize) -> Result<()> {
        match &self.pmid {
            Some(existing) if existing != pmid => Err(PedlError::InvalidInput(format!(
                "line {line_no}: PMID {pmid} inside block of PMID {existing}"
            ))),
            _ => {
                self.pmid = Some(pmid.to_string());
                Ok(())
            }
        }
    }

    fn finish(self) -> Option<Document> {
        let pmid = self.pmid?;
        let text = match (self.title, self.abstract_text) {
            (Some(title), Some(abstract_text)) => format!("{title} {abstract_text}"),
            (Some(title), None) => title,
            (None, Some(abstract_text)) => abstract_text,
            (None, None) => String::new(),
        };
        Some(Document {
            pmid,
            text,
            annotations: self.annotations,
        })
    }
}

/// Parse the content of a PubTator file
pub fn parse_pubtator(content: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut current = PartialDocument::default();

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() {
            if let Some(doc) = std::mem::take(&mut current).finish() {
                documents.push(doc);
            }
            continue;
        }

        if let Some((pmid, section, text)) = split_text_line(line) {
            current.set_pmid(pmid, line_no)?;
            match section {
                "t" => current.title = Some(text.to_string()),
                _ => current.abstract_text = Some(text.to_string()),
            }
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            // Relation lines (pmid, type, id, id) carry no mention
            continue;
        }
        current.set_pmid(fields[0], line_no)?;

        let kind = match fields[4].parse::<EntityKind>() {
            Ok(kind) => kind,
            Err(_) => continue,
        };
        let start = parse_offset(fields[1], line_no)?;
        let end = parse_offset(fields[2], line_no)?;
        let ids: Vec<String> = fields[5]
            .split([';', ','])
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "-")
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            continue;
        }

        current.annotations.push(Annotation {
            start,
            end,
            mention: fields[3].to_string(),
            kind,
            ids,
        });
    }

    if let Some(doc) = current.finish() {
        documents.push(doc);
    }

    Ok(documents)
}

/// Split `pmid|t|text` / `pmid|a|text`
fn split_text_line(line: &str) -> Option<(&str, &str, &str)> {
    let (pmid, rest) = line.split_once('|')?;
    if pmid.is_empty() || !pmid.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (section, text) = rest.split_once('|')?;
    matches!(section, "t" | "a").then_some((pmid, section, text))
}

fn parse_offset(value: &str, line_no: usize) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| PedlError::InvalidInput(format!("line {line_no}: invalid offset '{value}'")))
}

// ============================================================================
// Store
// ============================================================================

/// In-memory PubTator corpus indexed by entity
pub struct PubtatorStore {
    documents: HashMap<String, Document>,
    index: HashMap<Entity, BTreeSet<String>>,
    pmids_per_batch: usize,
}

impl PubtatorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            index: HashMap::new(),
            pmids_per_batch: DEFAULT_PMIDS_PER_BATCH,
        }
    }

    /// Build a store from parsed documents
    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut store = Self::new();
        for doc in documents {
            store.insert(doc);
        }
        store
    }

    /// Load a PubTator file, or every file in a directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();

        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| PedlError::io(path, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| PedlError::io(path, e))?;
                let file = entry.path();
                let hidden = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
                if file.is_file() && !hidden {
                    files.push(file);
                }
            }
            files.sort();
        } else {
            files.push(path.to_path_buf());
        }

        let mut store = Self::new();
        for file in &files {
            let content = std::fs::read_to_string(file).map_err(|e| PedlError::io(file, e))?;
            for doc in parse_pubtator(&content)? {
                store.insert(doc);
            }
        }

        tracing::info!(
            "Loaded {} documents from {} PubTator file(s) under {}",
            store.len(),
            files.len(),
            path.display()
        );
        Ok(store)
    }

    /// Set how many co-mention PMIDs are resolved per sentence batch
    pub fn with_pmids_per_batch(mut self, pmids_per_batch: usize) -> Self {
        self.pmids_per_batch = pmids_per_batch.max(1);
        self
    }

    /// Add a document, replacing any earlier one with the same PMID
    pub fn insert(&mut self, document: Document) {
        for annotation in &document.annotations {
            for id in &annotation.ids {
                self.index
                    .entry(Entity::new(annotation.kind, id.clone()))
                    .or_default()
                    .insert(document.pmid.clone());
            }
        }
        self.documents.insert(document.pmid.clone(), document);
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for PubtatorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceProvider for PubtatorStore {
    async fn get_pmids(&self, entity: &Entity) -> Result<BTreeSet<String>> {
        Ok(self.index.get(entity).cloned().unwrap_or_default())
    }

    async fn get_documents(&self, pmids: &[String]) -> Result<Vec<Vec<Document>>> {
        Ok(pmids
            .iter()
            .map(|pmid| self.documents.get(pmid).cloned().into_iter().collect())
            .collect())
    }

    fn get_sentences_from_document(
        &self,
        head: &Entity,
        tail: &Entity,
        document: &Document,
    ) -> Vec<Sentence> {
        sentences::co_mention_sentences(head, tail, document)
    }

    fn get_sentences<'a>(&'a self, pair: &'a EntityPair) -> BoxStream<'a, Vec<Sentence>> {
        stream_sentences(self, pair, self.pmids_per_batch)
    }

    fn is_local(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "pubtator"
    }
}

// ============================================================================
// Tests
// ============================================================================

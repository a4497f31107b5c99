//! Local corpus with a remote fallback
//!
//! Serves evidence from a primary provider (normally the local PubTator
//! copy) and asks a secondary one (normally the remote service) only for
//! what the primary lacks: entities without any local PMID and PMIDs
//! without a local document.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::stream::BoxStream;

use pedl_core::{Document, Entity, EntityPair, EvidenceProvider, Result, Sentence};

use crate::pubtator::DEFAULT_PMIDS_PER_BATCH;
use crate::{sentences, stream_sentences};

pub struct FallbackEvidence {
    primary: Box<dyn EvidenceProvider>,
    fallback: Box<dyn EvidenceProvider>,
    pmids_per_batch: usize,
    name: String,
}

impl FallbackEvidence {
    pub fn new(primary: Box<dyn EvidenceProvider>, fallback: Box<dyn EvidenceProvider>) -> Self {
        let name = format!("{}+{}", primary.name(), fallback.name());
        Self {
            primary,
            fallback,
            pmids_per_batch: DEFAULT_PMIDS_PER_BATCH,
            name,
        }
    }

    pub fn with_pmids_per_batch(mut self, pmids_per_batch: usize) -> Self {
        self.pmids_per_batch = pmids_per_batch.max(1);
        self
    }
}

#[async_trait]
impl EvidenceProvider for FallbackEvidence {
    async fn get_pmids(&self, entity: &Entity) -> Result<BTreeSet<String>> {
        match self.primary.get_pmids(entity).await {
            Ok(pmids) if !pmids.is_empty() => return Ok(pmids),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("PMID lookup for {} via {} failed: {}", entity, self.primary.name(), e)
            }
        }
        tracing::debug!("No local PMIDs for {}, asking {}", entity, self.fallback.name());
        self.fallback.get_pmids(entity).await
    }

    async fn get_documents(&self, pmids: &[String]) -> Result<Vec<Vec<Document>>> {
        let mut documents = match self.primary.get_documents(pmids).await {
            Ok(documents) if documents.len() == pmids.len() => documents,
            Ok(_) => vec![Vec::new(); pmids.len()],
            Err(e) => {
                tracing::warn!("Document fetch via {} failed: {}", self.primary.name(), e);
                vec![Vec::new(); pmids.len()]
            }
        };

        let missing: Vec<usize> = (0..pmids.len()).filter(|&i| documents[i].is_empty()).collect();
        if missing.is_empty() {
            return Ok(documents);
        }
        let missing_pmids: Vec<String> = missing.iter().map(|&i| pmids[i].clone()).collect();
        tracing::debug!("Fetching {} documents via {}", missing_pmids.len(), self.fallback.name());

        match self.fallback.get_documents(&missing_pmids).await {
            Ok(fetched) => {
                for (i, docs) in missing.into_iter().zip(fetched) {
                    documents[i] = docs;
                }
            }
            Err(e) => tracing::warn!(
                "Skipping {} documents missing locally: {}",
                missing_pmids.len(),
                e
            ),
        }
        Ok(documents)
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

    /// Local as far as pair generation is concerned: every entity is
    /// looked up locally first
    fn is_local(&self) -> bool {
        self.primary.is_local()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

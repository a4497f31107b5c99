//! PEDL Evidence - Co-mention evidence retrieval
//!
//! Provides:
//! - A local PubTator store (`PubtatorStore`)
//! - An HTTP evidence client (`RemoteEvidenceClient`)
//! - Local-first retrieval with a remote fallback (`FallbackEvidence`)
//! - Sentence splitting and entity blinding
//! - Gene symbol/name tables (`EntityResolver`)
//! - Curated pathway databases (`StatementDatabase`)
//!
//! Retrieval failures are never fatal here: a provider error while
//! resolving PMIDs or fetching documents is logged and treated as
//! "no evidence".

pub mod database;
pub mod fallback;
pub mod pubtator;
pub mod remote;
pub mod resolver;
pub mod sentences;

pub use database::{Statement, StatementDatabase, StatementKind};
pub use fallback::FallbackEvidence;
pub use pubtator::{parse_pubtator, PubtatorStore};
pub use remote::RemoteEvidenceClient;
pub use resolver::EntityResolver;

use std::collections::BTreeSet;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};

use pedl_core::{Entity, EntityPair, EvidenceProvider, Sentence};

/// PMIDs of an entity, empty if the provider fails
pub async fn pmids_or_empty<P>(provider: &P, entity: &Entity) -> BTreeSet<String>
where
    P: EvidenceProvider + ?Sized,
{
    match provider.get_pmids(entity).await {
        Ok(pmids) => pmids,
        Err(e) => {
            tracing::warn!("PMID lookup for {} via {} failed: {}", entity, provider.name(), e);
            BTreeSet::new()
        }
    }
}

/// PMIDs of documents mentioning both entities
pub async fn co_mention_pmids<P>(provider: &P, head: &Entity, tail: &Entity) -> BTreeSet<String>
where
    P: EvidenceProvider + ?Sized,
{
    let head_pmids = pmids_or_empty(provider, head).await;
    if head_pmids.is_empty() {
        return head_pmids;
    }
    let tail_pmids = pmids_or_empty(provider, tail).await;
    head_pmids.intersection(&tail_pmids).cloned().collect()
}

/// Sentences for the pair from the given documents, empty if the fetch fails
async fn sentences_for_pmids<P>(provider: &P, pair: &EntityPair, pmids: &[String]) -> Vec<Sentence>
where
    P: EvidenceProvider + ?Sized,
{
    match provider.get_documents(pmids).await {
        Ok(documents) => documents
            .iter()
            .flatten()
            .flat_map(|doc| provider.get_sentences_from_document(pair.head(), pair.tail(), doc))
            .collect(),
        Err(e) => {
            tracing::warn!(
                "Skipping {} documents for {} via {}: {}",
                pmids.len(),
                pair,
                provider.name(),
                e
            );
            Vec::new()
        }
    }
}

/// Lazy stream of sentence batches for a pair
///
/// Co-mention PMIDs are resolved on first poll and fetched
/// `pmids_per_batch` at a time; batches without sentences are dropped.
pub fn stream_sentences<'a, P>(
    provider: &'a P,
    pair: &'a EntityPair,
    pmids_per_batch: usize,
) -> BoxStream<'a, Vec<Sentence>>
where
    P: EvidenceProvider + ?Sized,
{
    let per_batch = pmids_per_batch.max(1);

    stream::once(co_mention_pmids(provider, pair.head(), pair.tail()))
        .flat_map(move |pmids| {
            let pmids: Vec<String> = pmids.into_iter().collect();
            let chunks: Vec<Vec<String>> = pmids.chunks(per_batch).map(<[String]>::to_vec).collect();
            stream::iter(chunks)
        })
        .then(move |chunk| async move { sentences_for_pmids(provider, pair, &chunk).await })
        .filter(|batch| future::ready(!batch.is_empty()))
        .boxed()
}

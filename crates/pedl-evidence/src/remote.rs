//! Remote evidence client
//!
//! Fetches co-mention evidence from an HTTP evidence service:
//! - `GET {base}/pmids?type=Gene&id=7157` returns `{"pmids": [...]}`
//! - `POST {base}/documents` with `{"pmids": [...]}` returns `{"documents": [...]}`
//!
//! Sentences are cut and blinded locally, exactly as for the PubTator store.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use pedl_core::{
    Document, Entity, EntityPair, EvidenceConfig, EvidenceProvider, PedlError, Result, Sentence,
};

use crate::pubtator::DEFAULT_PMIDS_PER_BATCH;
use crate::{sentences, stream_sentences};

/// HTTP evidence service client
pub struct RemoteEvidenceClient {
    client: Client,
    base_url: String,
    pmids_per_batch: usize,
}

#[derive(Debug, Serialize)]
struct DocumentsRequest<'a> {
    pmids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct PmidsResponse {
    pmids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    documents: Vec<Document>,
}

impl RemoteEvidenceClient {
    /// Create a new client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pmids_per_batch: DEFAULT_PMIDS_PER_BATCH,
        }
    }

    /// Create from config
    pub fn from_config(config: &EvidenceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PedlError::EvidenceUnavailable(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            base_url: config.remote_url.trim_end_matches('/').to_string(),
            pmids_per_batch: config.pmids_per_batch.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Arrange returned documents by the requested PMIDs
fn group_by_pmid(pmids: &[String], documents: Vec<Document>) -> Vec<Vec<Document>> {
    let mut by_pmid: HashMap<String, Vec<Document>> = HashMap::new();
    for doc in documents {
        by_pmid.entry(doc.pmid.clone()).or_default().push(doc);
    }
    pmids
        .iter()
        .map(|pmid| by_pmid.remove(pmid).unwrap_or_default())
        .collect()
}

#[async_trait]
impl EvidenceProvider for RemoteEvidenceClient {
    async fn get_pmids(&self, entity: &Entity) -> Result<BTreeSet<String>> {
        let response = self
            .client
            .get(format!("{}/pmids", self.base_url))
            .query(&[("type", entity.kind.as_str()), ("id", entity.id.as_str())])
            .send()
            .await
            .map_err(|e| PedlError::EvidenceUnavailable(format!("PMID request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PedlError::EvidenceUnavailable(format!(
                "PMID lookup for {entity} failed: {error_text}"
            )));
        }

        let result: PmidsResponse = response
            .json()
            .await
            .map_err(|e| PedlError::EvidenceUnavailable(format!("Invalid PMID response: {e}")))?;

        Ok(result.pmids.into_iter().collect())
    }

    async fn get_documents(&self, pmids: &[String]) -> Result<Vec<Vec<Document>>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/documents", self.base_url))
            .json(&DocumentsRequest { pmids })
            .send()
            .await
            .map_err(|e| PedlError::EvidenceUnavailable(format!("Document request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PedlError::EvidenceUnavailable(format!(
                "Document fetch failed: {error_text}"
            )));
        }

        let result: DocumentsResponse = response.json().await.map_err(|e| {
            PedlError::EvidenceUnavailable(format!("Invalid document response: {e}"))
        })?;

        Ok(group_by_pmid(pmids, result.documents))
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
        false
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pmid: &str) -> Document {
        Document {
            pmid: pmid.to_string(),
            text: String::new(),
            annotations: Vec::new(),
        }
    }

    #[test]
    fn test_group_by_pmid_keeps_request_order() {
        let pmids = vec!["3".to_string(), "1".to_string(), "2".to_string()];
        let grouped = group_by_pmid(&pmids, vec![doc("1"), doc("3"), doc("1")]);

        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].len(), 1);
        assert_eq!(grouped[1].len(), 2);
        assert!(grouped[2].is_empty());
    }

    #[test]
    fn test_base_url_normalized() {
        let client = RemoteEvidenceClient::new("http://localhost:8600/");
        assert_eq!(client.base_url(), "http://localhost:8600");
        assert!(!client.is_local());
    }

    #[test]
    fn test_documents_response_without_annotations() {
        let json = r#"{"documents": [{"pmid": "1", "text": "A binds B."}]}"#;
        let parsed: DocumentsResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.documents[0].annotations.is_empty());
    }
}

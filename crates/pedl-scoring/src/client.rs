//! HTTP client for the sentence scoring model
//!
//! The model runs behind a serving endpoint. One request carries one
//! batch of blinded sentences and is padded by the server to the
//! longest sentence of that batch.

use std::time::Duration;

use async_trait::async_trait;
use pedl_core::{
    PedlError, Pooling, Result, ScoredBatch, ScoringConfig, ScoringService, NUM_LABELS,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Scoring service reached over HTTP (`POST {base_url}/score`)
pub struct HttpScoringClient {
    client: Client,
    base_url: String,
    model: String,
    max_length: usize,
    pooling: Pooling,
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    model: &'a str,
    sentences: &'a [String],
    max_length: usize,
    pooling: Pooling,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    logits: Vec<Vec<f32>>,
    #[serde(default)]
    bag_logits: Option<Vec<f32>>,
}

impl HttpScoringClient {
    /// Create a new client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_length: 512,
            pooling: Pooling::LogSumExp,
        }
    }

    /// Create from config
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PedlError::Scoring(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_length: config.max_length,
            pooling: config.pooling,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn label_row(values: Vec<f32>) -> Result<[f32; NUM_LABELS]> {
    let width = values.len();
    values.try_into().map_err(|_| {
        PedlError::Scoring(format!(
            "Expected {NUM_LABELS} scores per sentence, got {width}"
        ))
    })
}

/// Validate the response shape against the request
fn into_batch(response: ScoreResponse, expected_rows: usize) -> Result<ScoredBatch> {
    if response.logits.len() != expected_rows {
        return Err(PedlError::Scoring(format!(
            "Scored {} sentences, sent {}",
            response.logits.len(),
            expected_rows
        )));
    }

    let logits = response
        .logits
        .into_iter()
        .map(label_row)
        .collect::<Result<Vec<_>>>()?;
    let bag_logits = response.bag_logits.map(label_row).transpose()?;

    Ok(ScoredBatch { logits, bag_logits })
}

#[async_trait]
impl ScoringService for HttpScoringClient {
    async fn score(&self, sentences_blinded: &[String]) -> Result<ScoredBatch> {
        if sentences_blinded.is_empty() {
            return Ok(ScoredBatch {
                logits: Vec::new(),
                bag_logits: None,
            });
        }

        let request = ScoreRequest {
            model: &self.model,
            sentences: sentences_blinded,
            max_length: self.max_length,
            pooling: self.pooling,
        };

        let response = self
            .client
            .post(format!("{}/score", self.base_url))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PedlError::Scoring(format!("Scoring request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PedlError::Scoring(format!(
                "Scoring service error: {error_text}"
            )));
        }

        let result: ScoreResponse = response
            .json()
            .await
            .map_err(|e| PedlError::Scoring(format!("Failed to parse scoring response: {e}")))?;

        into_batch(result, sentences_blinded.len())
    }
}

/// Create a scoring client from config
pub fn create_scoring_client(config: &ScoringConfig) -> Result<Box<dyn ScoringService>> {
    Ok(Box::new(HttpScoringClient::from_config(config)?))
}

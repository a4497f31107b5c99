//! PEDL Scoring - Batched sentence scoring
//!
//! Splits evidence sentences into batches, sends each batch to the
//! scoring model and assembles the probabilities into a `ScoreMatrix`
//! whose row `i` always belongs to input sentence `i`.

pub mod client;

pub use client::{create_scoring_client, HttpScoringClient};

use pedl_core::{PedlError, Result, ScoreMatrix, ScoringService, Sentence, NUM_LABELS};

/// Split a slice into chunks of at most `size` items (one chunk if `size` is 0)
///
/// The returned iterator is lazy and can be cloned to restart it.
pub fn chunks<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    let size = if size == 0 { items.len().max(1) } else { size };
    items.chunks(size)
}

/// Logistic sigmoid
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Runs sentences through a scoring service in fixed-size batches
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    /// `batch_size` of 0 scores everything in a single request
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Score sentences, returning one probability row per sentence in input order
    pub async fn run(
        &self,
        sentences: &[Sentence],
        service: &dyn ScoringService,
    ) -> Result<ScoreMatrix> {
        let mut matrix = ScoreMatrix::new();

        for batch in chunks(sentences, self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|s| s.text_blinded.clone()).collect();
            let scored = service.score(&texts).await?;

            if scored.logits.len() != batch.len() {
                return Err(PedlError::Scoring(format!(
                    "Scoring service returned {} rows for {} sentences",
                    scored.logits.len(),
                    batch.len()
                )));
            }
            if let Some(bag) = scored.bag_logits {
                tracing::debug!("Bag logits for batch of {}: {:?}", batch.len(), bag);
            }

            matrix.extend(scored.logits.iter().map(|row| {
                let mut probs = [0.0; NUM_LABELS];
                for (p, &logit) in probs.iter_mut().zip(row) {
                    *p = sigmoid(logit);
                }
                probs
            }));
        }

        Ok(matrix)
    }
}

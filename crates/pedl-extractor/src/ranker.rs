//! Extraction ranking
//!
//! Turns a score matrix into extraction records ordered by descending
//! probability.

use pedl_core::{
    ExtractionRecord, PedlError, RelationLabel, Result, ScoreMatrix, Sentence, TiePolicy,
    MODEL_SOURCE,
};

/// Ranks (sentence, label) cells by probability
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRanker {
    cutoff: f64,
    tie_policy: TiePolicy,
}

impl ExtractionRanker {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff,
            tie_policy: TiePolicy::default(),
        }
    }

    pub fn with_tie_policy(mut self, tie_policy: TiePolicy) -> Self {
        self.tie_policy = tie_policy;
        self
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Emit one record per cell with probability >= cutoff, highest first
    ///
    /// Cells with equal probability keep row-major order. Under
    /// `TiePolicy::Literal` a probability shared by `k` cells emits that
    /// group `k` times.
    pub fn rank(&self, scores: &ScoreMatrix, sentences: &[Sentence]) -> Result<Vec<ExtractionRecord>> {
        if scores.len() != sentences.len() {
            return Err(PedlError::InvalidInput(format!(
                "{} score rows for {} sentences",
                scores.len(),
                sentences.len()
            )));
        }
        if scores.is_empty() || scores.all_below(self.cutoff) {
            return Ok(Vec::new());
        }

        let mut cells: Vec<(f32, usize, RelationLabel)> = scores
            .rows()
            .iter()
            .enumerate()
            .flat_map(|(row, probs)| {
                RelationLabel::ALL
                    .into_iter()
                    .map(move |label| (probs[label.index()], row, label))
            })
            .collect();
        // Stable: equal values stay row-major
        cells.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut records = Vec::new();
        for group in cells.chunk_by(|a, b| a.0 == b.0) {
            if !(f64::from(group[0].0) >= self.cutoff) {
                continue;
            }

            let repeats = match self.tie_policy {
                TiePolicy::Literal => group.len(),
                TiePolicy::EmitOnce => 1,
            };
            for _ in 0..repeats {
                records.extend(group.iter().map(|&(score, row, label)| {
                    let sentence = &sentences[row];
                    ExtractionRecord {
                        label: label.to_string(),
                        score: f64::from(score),
                        pmid: sentence.pmid.clone(),
                        text: sentence.text.clone(),
                        source: MODEL_SOURCE.to_string(),
                    }
                }));
            }
        }

        Ok(records)
    }
}

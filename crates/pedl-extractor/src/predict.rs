//! Per-pair relation prediction
//!
//! For every pair the predictor writes curated database statements, then
//! streams evidence sentences through the scoring model and appends the
//! ranked extractions. A pair without any record, or whose scoring
//! fails, leaves no file behind.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use futures::StreamExt;
use pedl_core::{
    Entity, EntityPair, EvidenceProvider, ExtractionConfig, PedlError, Result, ScoreMatrix,
    ScoringService, Sentence,
};
use pedl_evidence::{EntityResolver, StatementDatabase};
use pedl_scoring::BatchScheduler;

use crate::ExtractionRanker;

/// Result of predicting a single pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    pub pair: EntityPair,
    /// Output file; only created when `records` is non-zero
    pub path: PathBuf,
    pub records: usize,
    /// Distinct evidence sentences scored
    pub sentences: usize,
}

impl PairOutcome {
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Drives evidence retrieval, scoring and ranking over a pair list
pub struct Predictor {
    evidence: Box<dyn EvidenceProvider>,
    scorer: Box<dyn ScoringService>,
    resolver: EntityResolver,
    databases: Vec<StatementDatabase>,
    scheduler: BatchScheduler,
    ranker: ExtractionRanker,
}

impl Predictor {
    pub fn new(
        evidence: Box<dyn EvidenceProvider>,
        scorer: Box<dyn ScoringService>,
        resolver: EntityResolver,
    ) -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            evidence,
            scorer,
            resolver,
            databases: Vec::new(),
            scheduler: BatchScheduler::new(50),
            ranker: ExtractionRanker::new(defaults.cutoff).with_tie_policy(defaults.tie_policy),
        }
    }

    pub fn with_databases(mut self, databases: Vec<StatementDatabase>) -> Self {
        self.databases = databases;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.scheduler = BatchScheduler::new(batch_size);
        self
    }

    pub fn with_ranker(mut self, ranker: ExtractionRanker) -> Self {
        self.ranker = ranker;
        self
    }

    /// Output file for a pair: `<name1>-<name2>.txt`
    ///
    /// A `-` inside a name is written as `_` so the stem splits back into
    /// the two names at its only dash.
    pub fn output_path(&self, pair: &EntityPair, out_dir: &Path) -> PathBuf {
        let file_name = |entity: &Entity| self.resolver.display_name(entity).replace('-', "_");
        out_dir.join(format!("{}-{}.txt", file_name(pair.head()), file_name(pair.tail())))
    }

    /// Predict every pair in order, writing one file per pair into `out_dir`
    pub async fn run(&self, pairs: &[EntityPair], out_dir: &Path) -> Result<Vec<PairOutcome>> {
        std::fs::create_dir_all(out_dir).map_err(|e| PedlError::io(out_dir, e))?;

        let mut outcomes = Vec::with_capacity(pairs.len());
        for (i, pair) in pairs.iter().enumerate() {
            tracing::info!(
                "[{}/{}] {}-{}",
                i + 1,
                pairs.len(),
                self.resolver.display_name(pair.head()),
                self.resolver.display_name(pair.tail())
            );
            outcomes.push(self.predict_pair(pair, out_dir).await?);
        }

        let written = outcomes.iter().filter(|o| !o.is_empty()).count();
        tracing::info!("Wrote {} of {} pair files to {}", written, pairs.len(), out_dir.display());

        Ok(outcomes)
    }

    /// Predict one pair
    pub async fn predict_pair(&self, pair: &EntityPair, out_dir: &Path) -> Result<PairOutcome> {
        let path = self.output_path(pair, out_dir);

        let mut seen_lines = HashSet::new();
        let mut lines: Vec<String> = self
            .databases
            .iter()
            .flat_map(|database| database.records(pair))
            .map(|record| record.to_line())
            .filter(|line| seen_lines.insert(line.clone()))
            .collect();

        let (sentences, scores) = self.score_evidence(pair).await?;
        lines.extend(
            self.ranker
                .rank(&scores, &sentences)?
                .iter()
                .map(|record| record.to_line()),
        );
        let records = lines.len();

        if records > 0 {
            let file = File::create(&path).map_err(|e| PedlError::io(&path, e))?;
            let mut writer = BufWriter::new(file);
            for line in &lines {
                writer
                    .write_all(line.as_bytes())
                    .map_err(|e| PedlError::io(&path, e))?;
            }
            writer.flush().map_err(|e| PedlError::io(&path, e))?;
        }
        tracing::debug!(
            "{} records from {} sentences for {}",
            records,
            sentences.len(),
            pair
        );

        Ok(PairOutcome {
            pair: pair.clone(),
            path,
            records,
            sentences: sentences.len(),
        })
    }

    /// Score distinct evidence sentences batch by batch
    ///
    /// Each evidence batch is sorted by text length before scoring so
    /// that model batches hold sentences of similar length.
    async fn score_evidence(&self, pair: &EntityPair) -> Result<(Vec<Sentence>, ScoreMatrix)> {
        let mut seen = HashSet::new();
        let mut sentences: Vec<Sentence> = Vec::new();
        let mut scores = ScoreMatrix::new();

        let mut stream = self.evidence.get_sentences(pair);
        while let Some(batch) = stream.next().await {
            let mut batch: Vec<Sentence> = batch
                .into_iter()
                .filter(|s| seen.insert(s.text.clone()))
                .collect();
            if batch.is_empty() {
                continue;
            }
            batch.sort_by_cached_key(|s| s.text.chars().count());

            let batch_scores = self.scheduler.run(&batch, self.scorer.as_ref()).await?;
            scores.extend(batch_scores.rows().iter().copied());
            sentences.extend(batch);
        }

        Ok((sentences, scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pedl_core::{Annotation, Document, EntityKind, ScoredBatch, NUM_LABELS};
    use pedl_evidence::{PubtatorStore, Statement, StatementKind};
    use std::sync::Mutex;

    /// Scores "inhibits" sentences high on the first label and records every request
    struct KeywordScorer {
        requests: Mutex<Vec<Vec<String>>>,
    }

    impl KeywordScorer {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScoringService for KeywordScorer {
        async fn score(&self, sentences_blinded: &[String]) -> Result<ScoredBatch> {
            self.requests.lock().unwrap().push(sentences_blinded.to_vec());
            Ok(ScoredBatch {
                logits: sentences_blinded
                    .iter()
                    .map(|s| {
                        let mut row = [-10.0; NUM_LABELS];
                        if s.contains("inhibits") {
                            row[0] = 5.0;
                        }
                        row
                    })
                    .collect(),
                bag_logits: None,
            })
        }
    }

    struct SharedScorer(std::sync::Arc<KeywordScorer>);

    struct FailingScorer;

    #[async_trait]
    impl ScoringService for FailingScorer {
        async fn score(&self, _sentences_blinded: &[String]) -> Result<ScoredBatch> {
            Err(PedlError::Scoring("model unavailable".to_string()))
        }
    }

    #[async_trait]
    impl ScoringService for SharedScorer {
        async fn score(&self, sentences_blinded: &[String]) -> Result<ScoredBatch> {
            self.0.score(sentences_blinded).await
        }
    }

    fn gene_annotation(text: &str, mention: &str, id: &str, nth: usize) -> Annotation {
        let byte = text.match_indices(mention).nth(nth).unwrap().0;
        let start = text[..byte].chars().count();
        Annotation {
            start,
            end: start + mention.chars().count(),
            mention: mention.to_string(),
            kind: EntityKind::Gene,
            ids: vec![id.to_string()],
        }
    }

    fn document(pmid: &str, text: &str, mentions: &[(&str, &str, usize)]) -> Document {
        Document {
            pmid: pmid.to_string(),
            text: text.to_string(),
            annotations: mentions
                .iter()
                .map(|(m, id, nth)| gene_annotation(text, m, id, *nth))
                .collect(),
        }
    }

    fn store() -> PubtatorStore {
        PubtatorStore::from_documents(vec![
            document(
                "100",
                "MDM2 inhibits TP53. Unrelated sentence.",
                &[("MDM2", "4193", 0), ("TP53", "7157", 0)],
            ),
            document(
                "200",
                "TP53 and MDM2 were measured. MDM2 inhibits TP53.",
                &[
                    ("TP53", "7157", 0),
                    ("MDM2", "4193", 0),
                    ("MDM2", "4193", 1),
                    ("TP53", "7157", 1),
                ],
            ),
            document("300", "EGFR is a receptor.", &[("EGFR", "1956", 0)]),
        ])
    }

    fn resolver() -> EntityResolver {
        let mut resolver = EntityResolver::new();
        resolver.insert("4193", "MDM2");
        resolver.insert("7157", "TP53");
        resolver.insert("1956", "EGFR");
        resolver
    }

    fn pair(head: &str, tail: &str) -> EntityPair {
        EntityPair::new(Entity::gene(head), Entity::gene(tail)).unwrap()
    }

    #[tokio::test]
    async fn test_predict_pair_writes_ranked_records() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = std::sync::Arc::new(KeywordScorer::new());
        let predictor = Predictor::new(
            Box::new(store()),
            Box::new(SharedScorer(scorer.clone())),
            resolver(),
        )
        .with_ranker(ExtractionRanker::new(0.5));

        let outcome = predictor
            .predict_pair(&pair("4193", "7157"), dir.path())
            .await
            .unwrap();

        assert_eq!(outcome.path, dir.path().join("MDM2-TP53.txt"));
        // Duplicate "MDM2 inhibits TP53." scored once
        assert_eq!(outcome.sentences, 2);
        assert_eq!(outcome.records, 1);

        let content = std::fs::read_to_string(&outcome.path).unwrap();
        assert_eq!(
            content,
            "controls-state-change-of\t0.99\t100\tMDM2 inhibits TP53.\tPEDL\n\n"
        );

        // Blinded text is what reaches the model
        let requests = scorer.requests.lock().unwrap();
        assert!(requests
            .iter()
            .flatten()
            .all(|s| s.contains("<e1><protein1/></e1>") && s.contains("<e2><protein2/></e2>")));
    }

    #[tokio::test]
    async fn test_predict_pair_without_records_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = Predictor::new(
            Box::new(store()),
            Box::new(KeywordScorer::new()),
            resolver(),
        );

        let outcome = predictor
            .predict_pair(&pair("4193", "1956"), dir.path())
            .await
            .unwrap();

        assert!(outcome.is_empty());
        assert!(!outcome.path.exists());
    }

    #[tokio::test]
    async fn test_scoring_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let statement = Statement {
            kind: StatementKind::Phosphorylation,
            pmids: vec!["42".to_string()],
            provenances: vec!["curated".to_string()],
        };
        let mut database = StatementDatabase::new("pid");
        database.add(Entity::gene("4193"), Entity::gene("7157"), statement);
        let predictor = Predictor::new(Box::new(store()), Box::new(FailingScorer), resolver())
            .with_databases(vec![database]);

        let pair = pair("4193", "7157");
        let result = predictor.predict_pair(&pair, dir.path()).await;

        assert!(matches!(result, Err(PedlError::Scoring(_))));
        assert!(!predictor.output_path(&pair, dir.path()).exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_output_path_escapes_dashes_in_names() {
        let mut resolver = resolver();
        resolver.insert("3105", "HLA-A");
        let predictor = Predictor::new(Box::new(store()), Box::new(KeywordScorer::new()), resolver);

        let path = predictor.output_path(&pair("3105", "7157"), Path::new("out"));
        assert_eq!(path, PathBuf::from("out/HLA_A-TP53.txt"));
    }

    #[tokio::test]
    async fn test_database_records_first_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let statement = Statement {
            kind: StatementKind::Phosphorylation,
            pmids: vec!["42".to_string()],
            provenances: vec!["curated".to_string()],
        };
        let mut first = StatementDatabase::new("pid");
        first.add(Entity::gene("4193"), Entity::gene("7157"), statement.clone());
        first.add(Entity::gene("4193"), Entity::gene("7157"), statement.clone());
        let mut second = StatementDatabase::new("reactome");
        second.add(Entity::gene("4193"), Entity::gene("7157"), statement);

        let predictor = Predictor::new(
            Box::new(store()),
            Box::new(KeywordScorer::new()),
            resolver(),
        )
        .with_databases(vec![first, second])
        .with_ranker(ExtractionRanker::new(0.5));

        let outcome = predictor
            .predict_pair(&pair("4193", "7157"), dir.path())
            .await
            .unwrap();
        let content = std::fs::read_to_string(&outcome.path).unwrap();
        let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();

        assert_eq!(outcome.records, 3);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("\tpid"));
        assert!(lines[1].ends_with("\treactome"));
        assert!(lines[2].ends_with("\tPEDL"));
    }

    #[tokio::test]
    async fn test_batches_sorted_by_length() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = std::sync::Arc::new(KeywordScorer::new());
        let predictor = Predictor::new(
            Box::new(store()),
            Box::new(SharedScorer(scorer.clone())),
            resolver(),
        );

        predictor
            .predict_pair(&pair("7157", "4193"), dir.path())
            .await
            .unwrap();

        let requests = scorer.requests.lock().unwrap();
        let lengths: Vec<usize> = requests.iter().flatten().map(|s| s.chars().count()).collect();
        assert_eq!(lengths.len(), 2);
        assert!(lengths[0] <= lengths[1]);
    }

    #[tokio::test]
    async fn test_run_creates_directory_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested").join("out");
        let predictor = Predictor::new(
            Box::new(store()),
            Box::new(KeywordScorer::new()),
            resolver(),
        )
        .with_ranker(ExtractionRanker::new(0.5));

        let pairs = vec![pair("4193", "7157"), pair("7157", "4193"), pair("1956", "7157")];
        let outcomes = predictor.run(&pairs, &out_dir).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].pair, pairs[0]);
        assert!(out_dir.join("MDM2-TP53.txt").exists());
        assert!(out_dir.join("TP53-MDM2.txt").exists());
        assert!(!out_dir.join("EGFR-TP53.txt").exists());
    }
}

//! Distantly supervised training-set construction
//!
//! Every sentence that co-mentions a pair with known relations becomes a
//! training example labeled with all of the pair's relations. Work is
//! sharded by position in the sorted PMID list so that independent
//! workers produce disjoint, reproducible output files.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use pedl_core::{Entity, EntityKind, EntityPair, EvidenceProvider, PedlError, Result, TrainingRecord};
use pedl_evidence::co_mention_pmids;

/// Known relations per ordered pair
pub type RelationMap = BTreeMap<EntityPair, BTreeSet<String>>;

const PROGRESS_EVERY: usize = 1000;

// ============================================================================
// Output
// ============================================================================

/// Line writer that reports failures against its output path
pub struct ShardWriter<W> {
    path: PathBuf,
    inner: W,
}

impl<W: Write> ShardWriter<W> {
    pub fn new(path: impl Into<PathBuf>, inner: W) -> Self {
        Self {
            path: path.into(),
            inner,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner
            .write_all(line.as_bytes())
            .map_err(|e| PedlError::io(&self.path, e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(|e| PedlError::io(&self.path, e))
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl ShardWriter<BufWriter<File>> {
    /// Create (or truncate) the file at `path`
    pub fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path).map_err(|e| PedlError::io(&path, e))?;
        Ok(Self::new(path, BufWriter::new(file)))
    }
}

// ============================================================================
// Triples
// ============================================================================

/// Parse `head_type\thead_id\ttail_type\ttail_id\trelation` lines
///
/// Blank lines are ignored. Self-pairs are skipped.
pub fn parse_triples(content: &str) -> Result<RelationMap> {
    let mut relations = RelationMap::new();

    for (i, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |reason: String| PedlError::MalformedTriple {
            line: i + 1,
            reason,
        };

        let fields: Vec<&str> = line.split('\t').collect();
        let [head_kind, head_id, tail_kind, tail_id, relation] = fields[..] else {
            return Err(malformed(format!("expected 5 fields, got {}", fields.len())));
        };

        let head_kind: EntityKind = head_kind
            .parse()
            .map_err(|_| malformed(format!("unknown entity type '{head_kind}'")))?;
        let tail_kind: EntityKind = tail_kind
            .parse()
            .map_err(|_| malformed(format!("unknown entity type '{tail_kind}'")))?;

        let Some(pair) = EntityPair::new(
            Entity::new(head_kind, head_id),
            Entity::new(tail_kind, tail_id),
        ) else {
            tracing::debug!("Skipping self-relation on line {}", i + 1);
            continue;
        };

        relations.entry(pair).or_default().insert(relation.to_string());
    }

    Ok(relations)
}

/// Read a triples file
pub fn read_triples(path: impl AsRef<Path>) -> Result<RelationMap> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| PedlError::io(path, e))?;
    parse_triples(&content)
}

// ============================================================================
// Sharding
// ============================================================================

/// One worker's slice of the PMID list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    worker_id: usize,
    n_worker: usize,
}

impl Shard {
    /// Fails unless `n_worker >= 1` and `worker_id < n_worker`
    pub fn new(worker_id: usize, n_worker: usize) -> Result<Self> {
        if n_worker == 0 || worker_id >= n_worker {
            return Err(PedlError::InvalidShard {
                worker_id,
                n_worker,
            });
        }
        Ok(Self {
            worker_id,
            n_worker,
        })
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn n_worker(&self) -> usize {
        self.n_worker
    }

    /// Whether the PMID at `position` in the sorted list belongs to this worker
    pub fn owns(&self, position: usize) -> bool {
        position % self.n_worker == self.worker_id
    }

    /// `<path>.<worker_id>`
    pub fn output_path(&self, path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(format!(".{}", self.worker_id));
        PathBuf::from(name)
    }
}

// ============================================================================
// Crawler
// ============================================================================

/// Counters from one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// PMIDs co-mentioning at least one pair
    pub pmids_total: usize,
    pub pmids_assigned: usize,
    pub documents_found: usize,
    pub records_written: usize,
}

/// Crawls evidence documents for pairs with known relations
pub struct CorpusCrawler<'a> {
    evidence: &'a dyn EvidenceProvider,
    shard: Shard,
}

impl<'a> CorpusCrawler<'a> {
    pub fn new(evidence: &'a dyn EvidenceProvider, shard: Shard) -> Self {
        Self { evidence, shard }
    }

    /// Invert pairs into PMID -> co-mentioned pairs, sorted by PMID
    pub async fn plan(&self, relations: &RelationMap) -> BTreeMap<String, BTreeSet<EntityPair>> {
        tracing::info!("Collecting co-mentions for {} pairs", relations.len());

        let mut by_pmid: BTreeMap<String, BTreeSet<EntityPair>> = BTreeMap::new();
        for pair in relations.keys() {
            for pmid in co_mention_pmids(self.evidence, pair.head(), pair.tail()).await {
                by_pmid.entry(pmid).or_default().insert(pair.clone());
            }
        }

        by_pmid
    }

    /// Write raw and blinded training lines for this worker's PMIDs
    pub async fn crawl<W: Write>(
        &self,
        relations: &RelationMap,
        raw: &mut ShardWriter<W>,
        blinded: &mut ShardWriter<W>,
    ) -> Result<CrawlReport> {
        let plan = self.plan(relations).await;
        let mut report = CrawlReport {
            pmids_total: plan.len(),
            ..Default::default()
        };

        for (position, (pmid, pairs)) in plan.iter().enumerate() {
            if !self.shard.owns(position) {
                continue;
            }
            report.pmids_assigned += 1;
            if report.pmids_assigned % PROGRESS_EVERY == 0 {
                tracing::info!(
                    "Worker {}: {} PMIDs processed",
                    self.shard.worker_id(),
                    report.pmids_assigned
                );
            }

            let documents = match self.evidence.get_documents(std::slice::from_ref(pmid)).await {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::warn!("Skipping PMID {}: {}", pmid, e);
                    continue;
                }
            };
            let Some(document) = documents.into_iter().flatten().next() else {
                tracing::debug!("No document for PMID {}", pmid);
                continue;
            };
            report.documents_found += 1;

            for pair in pairs {
                let Some(labels) = relations.get(pair) else {
                    continue;
                };
                let sentences = self
                    .evidence
                    .get_sentences_from_document(pair.head(), pair.tail(), &document);
                for sentence in sentences {
                    let record = TrainingRecord {
                        head: pair.head().clone(),
                        tail: pair.tail().clone(),
                        relations: labels.clone(),
                        text: sentence.text,
                        text_blinded: sentence.text_blinded,
                        pmid: sentence.pmid,
                    };
                    raw.write_line(&record.raw_line())?;
                    blinded.write_line(&record.blinded_line())?;
                    report.records_written += 1;
                }
            }
        }

        Ok(report)
    }

    /// Crawl into `<out>.<worker_id>` and `<out_blinded>.<worker_id>`
    pub async fn build_training_set(
        &self,
        relations: &RelationMap,
        out: &Path,
        out_blinded: &Path,
    ) -> Result<CrawlReport> {
        let raw_path = self.shard.output_path(out);
        let blinded_path = self.shard.output_path(out_blinded);

        let mut raw = ShardWriter::create(raw_path)?;
        let mut blinded = ShardWriter::create(blinded_path)?;

        let report = self.crawl(relations, &mut raw, &mut blinded).await?;

        raw.flush()?;
        blinded.flush()?;

        tracing::info!(
            "Worker {}/{}: {} examples from {} of {} PMIDs",
            self.shard.worker_id(),
            self.shard.n_worker(),
            report.records_written,
            report.documents_found,
            report.pmids_assigned
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pedl_core::{Annotation, Document};
    use pedl_evidence::PubtatorStore;
    use proptest::prelude::*;

    const TRIPLES: &str = "Gene\t4193\tGene\t7157\tcontrols-state-change-of\n\
                           Gene\t4193\tGene\t7157\tin-complex-with\n\
                           \n\
                           Chemical\tMESH:D000001\tGene\t7157\tchemical-affects\n\
                           Gene\t7157\tGene\t7157\tin-complex-with\n";

    fn annotation(text: &str, mention: &str, kind: EntityKind, id: &str) -> Annotation {
        let byte = text.find(mention).unwrap();
        let start = text[..byte].chars().count();
        Annotation {
            start,
            end: start + mention.chars().count(),
            mention: mention.to_string(),
            kind,
            ids: vec![id.to_string()],
        }
    }

    fn store() -> PubtatorStore {
        let doc = |pmid: &str, text: &str| Document {
            pmid: pmid.to_string(),
            text: text.to_string(),
            annotations: vec![
                annotation(text, "MDM2", EntityKind::Gene, "4193"),
                annotation(text, "TP53", EntityKind::Gene, "7157"),
            ],
        };
        let mut with_drug = doc("30", "Azide treatment stabilizes TP53 against MDM2.");
        with_drug.annotations.push(annotation(
            &with_drug.text,
            "Azide",
            EntityKind::Chemical,
            "MESH:D000001",
        ));

        PubtatorStore::from_documents(vec![
            doc("10", "MDM2 binds TP53. Nothing else here."),
            doc("20", "TP53 is degraded by MDM2."),
            with_drug,
        ])
    }

    #[test]
    fn test_parse_triples() {
        let relations = parse_triples(TRIPLES).unwrap();
        assert_eq!(relations.len(), 2);

        let pair = EntityPair::new(Entity::gene("4193"), Entity::gene("7157")).unwrap();
        let labels: Vec<&str> = relations[&pair].iter().map(String::as_str).collect();
        assert_eq!(labels, vec!["controls-state-change-of", "in-complex-with"]);
    }

    #[test]
    fn test_parse_triples_malformed() {
        let err = parse_triples("Gene\t1\tGene\trel\n").unwrap_err();
        assert!(matches!(err, PedlError::MalformedTriple { line: 1, .. }));

        let err = parse_triples("\nProtein\t1\tGene\t2\trel\n").unwrap_err();
        assert!(matches!(err, PedlError::MalformedTriple { line: 2, .. }));
    }

    #[test]
    fn test_shard_validation() {
        assert!(Shard::new(0, 1).is_ok());
        assert!(matches!(
            Shard::new(2, 2),
            Err(PedlError::InvalidShard {
                worker_id: 2,
                n_worker: 2
            })
        ));
        assert!(Shard::new(0, 0).is_err());
    }

    #[test]
    fn test_shard_output_path() {
        let shard = Shard::new(3, 4).unwrap();
        assert_eq!(
            shard.output_path(Path::new("data/train.tsv")),
            PathBuf::from("data/train.tsv.3")
        );
    }

    proptest! {
        #[test]
        fn shards_partition_positions(n_worker in 1usize..16, len in 0usize..200) {
            let shards: Vec<Shard> = (0..n_worker).map(|w| Shard::new(w, n_worker).unwrap()).collect();
            for position in 0..len {
                let owners = shards.iter().filter(|s| s.owns(position)).count();
                prop_assert_eq!(owners, 1);
            }
        }
    }

    async fn crawl_to_strings(store: &PubtatorStore, shard: Shard) -> (String, String, CrawlReport) {
        let relations = parse_triples(TRIPLES).unwrap();
        let mut raw = ShardWriter::new("train.tsv", Vec::new());
        let mut blinded = ShardWriter::new("train_blinded.tsv", Vec::new());
        let report = CorpusCrawler::new(store, shard)
            .crawl(&relations, &mut raw, &mut blinded)
            .await
            .unwrap();
        (
            String::from_utf8(raw.into_inner()).unwrap(),
            String::from_utf8(blinded.into_inner()).unwrap(),
            report,
        )
    }

    /// Accepts nothing, like a full disk
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_error_names_output_path() {
        let store = store();
        let relations = parse_triples(TRIPLES).unwrap();
        let mut raw = ShardWriter::new("data/train.tsv.0", FullDisk);
        let mut blinded = ShardWriter::new("data/train_blinded.tsv.0", FullDisk);

        let err = CorpusCrawler::new(&store, Shard::new(0, 1).unwrap())
            .crawl(&relations, &mut raw, &mut blinded)
            .await
            .unwrap_err();

        match err {
            PedlError::Io { path, .. } => assert_eq!(path, PathBuf::from("data/train.tsv.0")),
            other => panic!("expected IO error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_crawl_single_worker() {
        let store = store();
        let (raw, blinded, report) = crawl_to_strings(&store, Shard::new(0, 1).unwrap()).await;

        assert_eq!(report.pmids_total, 3);
        assert_eq!(report.pmids_assigned, 3);
        assert_eq!(report.documents_found, 3);
        // Three MDM2/TP53 sentences plus one Azide/TP53 sentence
        assert_eq!(report.records_written, 4);

        let first = raw.lines().next().unwrap();
        assert_eq!(
            first,
            "Gene\t4193\tGene\t7157\tcontrols-state-change-of,in-complex-with\tMDM2 binds TP53.\t10"
        );
        assert!(raw.contains(
            "Chemical\tMESH:D000001\tGene\t7157\tchemical-affects\tAzide treatment stabilizes TP53 against MDM2.\t30"
        ));
        assert_eq!(blinded.lines().count(), raw.lines().count());
        assert!(blinded
            .lines()
            .all(|l| l.contains("<e1><protein1/></e1>") && l.contains("<e2><protein2/></e2>")));
    }

    #[tokio::test]
    async fn test_crawl_is_deterministic_and_sharded() {
        let store = store();
        let (raw_a, blinded_a, _) = crawl_to_strings(&store, Shard::new(0, 1).unwrap()).await;
        let (raw_b, blinded_b, _) = crawl_to_strings(&store, Shard::new(0, 1).unwrap()).await;
        assert_eq!(raw_a, raw_b);
        assert_eq!(blinded_a, blinded_b);

        // Sorted PMIDs 10, 20, 30: worker 0 of 2 takes 10 and 30
        let (raw_w0, _, report_w0) = crawl_to_strings(&store, Shard::new(0, 2).unwrap()).await;
        let (raw_w1, _, report_w1) = crawl_to_strings(&store, Shard::new(1, 2).unwrap()).await;
        assert_eq!(report_w0.pmids_assigned, 2);
        assert_eq!(report_w1.pmids_assigned, 1);
        assert!(raw_w1.lines().all(|l| l.ends_with("\t20")));
        assert_eq!(
            raw_w0.lines().count() + raw_w1.lines().count(),
            raw_a.lines().count()
        );
    }

    #[tokio::test]
    async fn test_build_training_set_writes_worker_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let relations = parse_triples(TRIPLES).unwrap();
        let out = dir.path().join("train.tsv");
        let out_blinded = dir.path().join("train_blinded.tsv");

        let report = CorpusCrawler::new(&store, Shard::new(1, 2).unwrap())
            .build_training_set(&relations, &out, &out_blinded)
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("train.tsv.1")).unwrap();
        assert_eq!(raw.lines().count(), report.records_written);
        assert!(dir.path().join("train_blinded.tsv.1").exists());
        assert!(!dir.path().join("train.tsv.0").exists());
    }
}

//! PEDL Extractor - Relation prediction pipeline
//!
//! Generates candidate entity pairs, scores their co-mention evidence,
//! ranks the extractions and writes one file per pair. Also builds
//! distantly supervised training sets and summary tables.

pub mod crawl;
pub mod pairs;
pub mod predict;
pub mod ranker;
pub mod summary;

pub use crawl::{
    parse_triples, read_triples, CorpusCrawler, CrawlReport, RelationMap, Shard, ShardWriter,
};
pub use pairs::{read_entity_list, PairGenerator, DEFAULT_MAX_REMOTE_PAIRS};
pub use predict::{PairOutcome, Predictor};
pub use ranker::ExtractionRanker;
pub use summary::{default_output_path, SummaryAggregator, SummaryRow, SUMMARY_HEADER};

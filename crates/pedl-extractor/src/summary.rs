//! Summary table over a directory of per-pair extraction files

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use pedl_core::{ExtractionRecord, PedlError, Result, SummaryAggregate};

/// Association type used when types are folded together
pub const ANY_ASSOCIATION: &str = "any";

pub const SUMMARY_HEADER: &str = "p1\tassociation type\tp2\tscore (sum)\tscore (max)\n";

/// One aggregated (p1, association type, p2) row
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub p1: String,
    pub association: String,
    pub p2: String,
    pub score_sum: f64,
    pub score_max: f64,
}

impl SummaryRow {
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{:.2}\t{:.2}\n",
            self.p1, self.association, self.p2, self.score_sum, self.score_max
        )
    }

    fn aggregate(&self, aggregate: SummaryAggregate) -> f64 {
        match aggregate {
            SummaryAggregate::Sum => self.score_sum,
            SummaryAggregate::Max => self.score_max,
        }
    }
}

/// `<dir>.tsv` next to the directory
pub fn default_output_path(dir: &Path) -> PathBuf {
    let name = dir.file_name().map(PathBuf::from).unwrap_or_default();
    dir.parent()
        .unwrap_or_else(|| Path::new(""))
        .join(name)
        .with_extension("tsv")
}

/// Merges per-pair files into a score table
#[derive(Debug, Clone)]
pub struct SummaryAggregator {
    cutoff: f64,
    no_association_type: bool,
    aggregate: SummaryAggregate,
}

impl SummaryAggregator {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff,
            no_association_type: false,
            aggregate: SummaryAggregate::default(),
        }
    }

    /// Fold all association types into `any`
    pub fn with_no_association_type(mut self, no_association_type: bool) -> Self {
        self.no_association_type = no_association_type;
        self
    }

    pub fn with_aggregate(mut self, aggregate: SummaryAggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Aggregate every `*.txt` file in `dir`, rows sorted by key
    ///
    /// File stems split at the first `-`. Names containing `-` only
    /// round-trip because the predictor writes them with `_`.
    pub fn build(&self, dir: &Path) -> Result<Vec<SummaryRow>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| PedlError::io(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();

        let mut groups: BTreeMap<(String, String, String), (f64, f64)> = BTreeMap::new();
        for path in &files {
            let Some((p1, p2)) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.split_once('-'))
            else {
                tracing::warn!("Skipping {}: name is not <p1>-<p2>.txt", path.display());
                continue;
            };

            let content = std::fs::read_to_string(path).map_err(|e| PedlError::io(path, e))?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                let record = match ExtractionRecord::from_line(line) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!("Skipping line in {}: {}", path.display(), e);
                        continue;
                    }
                };
                let association = if self.no_association_type {
                    ANY_ASSOCIATION.to_string()
                } else {
                    record.label
                };

                let score = record.score;
                let (sum, max) = groups
                    .entry((p1.to_string(), association, p2.to_string()))
                    .or_insert((0.0, f64::NEG_INFINITY));
                *sum += score;
                *max = max.max(score);
            }
        }

        Ok(groups
            .into_iter()
            .map(|((p1, association, p2), (score_sum, score_max))| SummaryRow {
                p1,
                association,
                p2,
                score_sum,
                score_max,
            })
            .filter(|row| row.aggregate(self.aggregate) >= self.cutoff)
            .collect())
    }

    /// Build the table for `dir` and write it to `out` (default `<dir>.tsv`)
    pub fn summarize(&self, dir: &Path, out: Option<&Path>) -> Result<PathBuf> {
        let out = out.map_or_else(|| default_output_path(dir), Path::to_path_buf);
        let rows = self.build(dir)?;

        let file = File::create(&out).map_err(|e| PedlError::io(&out, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(SUMMARY_HEADER.as_bytes())
            .map_err(|e| PedlError::io(&out, e))?;
        for row in &rows {
            writer
                .write_all(row.to_line().as_bytes())
                .map_err(|e| PedlError::io(&out, e))?;
        }
        writer.flush().map_err(|e| PedlError::io(&out, e))?;

        tracing::info!("Wrote {} summary rows to {}", rows.len(), out.display());
        Ok(out)
    }
}

//! Curated pathway databases
//!
//! Reads PathwayCommons extended SIF exports and serves the statements
//! recorded for an ordered entity pair. Their records are written ahead
//! of model predictions in the per-pair output files.
//!
//! Statement records carry a fixed score of 1.0, which the shared record
//! format writes with two decimals (`1.00`) like every other score, so
//! the summary parses both kinds of line the same way.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pedl_core::{Entity, EntityPair, ExtractionRecord, PedlError, Result};

use crate::resolver::EntityResolver;

/// Kind of a curated statement, each with its own output label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Complex,
    Phosphorylation,
    Modification,
    Translocation,
    IncreaseAmount,
    Conversion,
    Interaction,
}

impl StatementKind {
    /// Label written to the output file
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complex => "Complex",
            Self::Phosphorylation => "Phosphorylation",
            Self::Modification => "Modification",
            Self::Translocation => "Translocation",
            Self::IncreaseAmount => "IncreaseAmount",
            Self::Conversion => "Conversion",
            Self::Interaction => "Interaction",
        }
    }

    /// Map a SIF interaction type; `None` for types without a statement kind
    pub fn from_sif(interaction_type: &str) -> Option<Self> {
        match interaction_type {
            "in-complex-with" => Some(Self::Complex),
            "controls-phosphorylation-of" => Some(Self::Phosphorylation),
            "controls-state-change-of" => Some(Self::Modification),
            "controls-transport-of" => Some(Self::Translocation),
            "controls-expression-of" => Some(Self::IncreaseAmount),
            "catalysis-precedes" => Some(Self::Conversion),
            "interacts-with" => Some(Self::Interaction),
            _ => None,
        }
    }

    /// Undirected kinds hold for both orders of a pair
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::Complex | Self::Interaction)
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A curated statement about an ordered pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub pmids: Vec<String>,
    pub provenances: Vec<String>,
}

/// Statements of one database, keyed by ordered entity pair
#[derive(Debug, Clone)]
pub struct StatementDatabase {
    name: String,
    statements: HashMap<(Entity, Entity), Vec<Statement>>,
}

impl StatementDatabase {
    /// Create an empty database
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statements: HashMap::new(),
        }
    }

    /// Load a SIF file; the database is named after the file stem
    pub fn open(path: impl AsRef<Path>, resolver: &EntityResolver) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PedlError::io(path, e))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("db")
            .to_string();

        let db = Self::parse_sif(name, &content, resolver);
        tracing::info!("Loaded {} statements from database {}", db.len(), db.name);
        Ok(db)
    }

    /// Parse extended SIF:
    /// `PARTICIPANT_A  INTERACTION_TYPE  PARTICIPANT_B  DATA_SOURCE  PUBMED_IDS ...`
    pub fn parse_sif(name: impl Into<String>, content: &str, resolver: &EntityResolver) -> Self {
        let mut db = Self::new(name);

        for line in content.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 || fields[0] == "PARTICIPANT_A" {
                continue;
            }
            let Some(kind) = StatementKind::from_sif(fields[1].trim()) else {
                continue;
            };
            let (Some(a), Some(b)) = (participant(resolver, fields[0]), participant(resolver, fields[2]))
            else {
                tracing::debug!("Skipping statement with unresolved participant: {line}");
                continue;
            };

            let provenances = split_list(fields.get(3).copied());
            let pmids = split_list(fields.get(4).copied());
            let statement = Statement {
                kind,
                pmids,
                provenances,
            };

            if kind.is_symmetric() {
                db.add(b.clone(), a.clone(), statement.clone());
            }
            db.add(a, b, statement);
        }

        db
    }

    /// Add a statement about (head, tail)
    pub fn add(&mut self, head: Entity, tail: Entity, statement: Statement) {
        self.statements
            .entry((head, tail))
            .or_default()
            .push(statement);
    }

    /// Statements recorded for (head, tail)
    pub fn statements(&self, head: &Entity, tail: &Entity) -> &[Statement] {
        self.statements
            .get(&(head.clone(), tail.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Output records for a pair, score fixed at 1.0
    pub fn records(&self, pair: &EntityPair) -> Vec<ExtractionRecord> {
        self.statements(pair.head(), pair.tail())
            .iter()
            .map(|s| ExtractionRecord {
                label: s.kind.label().to_string(),
                score: 1.0,
                pmid: s.pmids.join(","),
                text: s.provenances.join(","),
                source: self.name.clone(),
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored statements (symmetric ones count twice)
    pub fn len(&self) -> usize {
        self.statements.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

fn participant(resolver: &EntityResolver, name: &str) -> Option<Entity> {
    resolver.resolve(name).ok()
}

fn split_list(field: Option<&str>) -> Vec<String> {
    field
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIF: &str = "\
PARTICIPANT_A\tINTERACTION_TYPE\tPARTICIPANT_B\tINTERACTION_DATA_SOURCE\tINTERACTION_PUBMED_ID
TP53\tcontrols-expression-of\tMDM2\treactome;kegg\t111;222
TP53\tin-complex-with\tMDM2\treactome\t333
TP53\tused-to-produce\tMDM2\treactome\t444
UNKNOWN\tin-complex-with\tMDM2\treactome\t555
";

    fn db() -> StatementDatabase {
        let resolver = EntityResolver::parse_tsv("7157\tTP53\n4193\tMDM2\n");
        StatementDatabase::parse_sif("pid", SIF, &resolver)
    }

    #[test]
    fn test_parse_sif_directed_and_symmetric() {
        let db = db();
        let tp53 = Entity::gene("7157");
        let mdm2 = Entity::gene("4193");

        let forward = db.statements(&tp53, &mdm2);
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].kind, StatementKind::IncreaseAmount);
        assert_eq!(forward[0].pmids, vec!["111", "222"]);
        assert_eq!(forward[0].provenances, vec!["reactome", "kegg"]);

        let backward = db.statements(&mdm2, &tp53);
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].kind, StatementKind::Complex);
        assert_eq!(db.len(), 3);
    }

    #[test]
    fn test_records() {
        let db = db();
        let pair = EntityPair::new(Entity::gene("7157"), Entity::gene("4193")).unwrap();
        let records = db.records(&pair);

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].to_line(),
            "IncreaseAmount\t1.00\t111,222\treactome,kegg\tpid\n\n"
        );
        assert_eq!(records[1].label, "Complex");
    }

    #[test]
    fn test_statement_kind_labels() {
        assert_eq!(StatementKind::from_sif("interacts-with"), Some(StatementKind::Interaction));
        assert_eq!(StatementKind::from_sif("chemical-affects"), None);
        assert!(!StatementKind::Phosphorylation.is_symmetric());
        assert_eq!(StatementKind::Translocation.to_string(), "Translocation");
    }
}

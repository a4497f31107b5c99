//! Entity name resolution
//!
//! Maps gene symbols to canonical NCBI gene ids and canonical ids back
//! to display names. Tables are built once per run and passed around
//! explicitly.

use std::collections::HashMap;
use std::path::Path;

use pedl_core::{Entity, PedlError, Result};

/// Prefixes of canonical chemical identifiers
const CHEMICAL_PREFIXES: [&str; 2] = ["MESH:", "CHEBI:"];

/// Symbol <-> id lookup tables
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    symbol_to_id: HashMap<String, String>,
    id_to_name: HashMap<String, String>,
}

impl EntityResolver {
    /// Create a resolver with empty tables (canonical ids only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `gene_id<TAB>symbol` table
    pub fn from_tsv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PedlError::io(path, e))?;
        let resolver = Self::parse_tsv(&content);
        tracing::info!(
            "Loaded {} gene symbols from {}",
            resolver.symbol_to_id.len(),
            path.display()
        );
        Ok(resolver)
    }

    /// Parse a `gene_id<TAB>symbol` table; lines without a numeric id are skipped
    pub fn parse_tsv(content: &str) -> Self {
        let mut resolver = Self::new();
        for line in content.lines() {
            let mut fields = line.split('\t');
            let (Some(id), Some(symbol)) = (fields.next(), fields.next()) else {
                continue;
            };
            let (id, symbol) = (id.trim(), symbol.trim());
            if is_gene_id(id) && !symbol.is_empty() {
                resolver.insert(id, symbol);
            }
        }
        resolver
    }

    /// Register a gene symbol; the first symbol seen for an id is its display name
    pub fn insert(&mut self, id: impl Into<String>, symbol: impl Into<String>) {
        let (id, symbol) = (id.into(), symbol.into());
        self.id_to_name
            .entry(id.clone())
            .or_insert_with(|| symbol.clone());
        self.symbol_to_id.insert(symbol, id);
    }

    /// The entity for an already canonical identifier
    pub fn canonical(name: &str) -> Option<Entity> {
        if is_gene_id(name) {
            return Some(Entity::gene(name));
        }
        CHEMICAL_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix) && name.len() > prefix.len())
            .then(|| Entity::chemical(name))
    }

    /// Look up a gene symbol
    pub fn lookup_symbol(&self, symbol: &str) -> Option<Entity> {
        self.symbol_to_id.get(symbol).map(Entity::gene)
    }

    /// Canonical ids resolve to themselves, symbols through the table
    pub fn resolve(&self, name: &str) -> Result<Entity> {
        let name = name.trim();
        Self::canonical(name)
            .or_else(|| self.lookup_symbol(name))
            .ok_or_else(|| PedlError::UnresolvedEntity(name.to_string()))
    }

    /// Resolve every name, failing on the first unresolvable one
    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Entity>> {
        names.iter().map(|n| self.resolve(n.as_ref())).collect()
    }

    /// Human-readable name used for output files; the id if unknown
    pub fn display_name<'a>(&'a self, entity: &'a Entity) -> &'a str {
        self.id_to_name
            .get(&entity.id)
            .map(String::as_str)
            .unwrap_or(&entity.id)
    }
}

fn is_gene_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

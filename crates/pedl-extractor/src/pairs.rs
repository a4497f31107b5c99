//! Candidate pair generation
//!
//! Builds the ordered work list of entity pairs from two input lists.

use std::path::Path;

use pedl_core::{Entity, EntityPair, PedlError, Result};

/// Default pair limit when no local evidence store is available
pub const DEFAULT_MAX_REMOTE_PAIRS: usize = 100;

/// Builds (p1, p2) work lists with optional reverse pairs
#[derive(Debug, Clone)]
pub struct PairGenerator {
    local_evidence: bool,
    max_remote_pairs: usize,
}

impl PairGenerator {
    /// `local_evidence` lifts the pair limit
    pub fn new(local_evidence: bool) -> Self {
        Self {
            local_evidence,
            max_remote_pairs: DEFAULT_MAX_REMOTE_PAIRS,
        }
    }

    /// Set the pair limit for remote-only operation
    pub fn with_max_remote_pairs(mut self, max_remote_pairs: usize) -> Self {
        self.max_remote_pairs = max_remote_pairs;
        self
    }

    /// Cartesian product of `p1s` x `p2s` in list order
    ///
    /// Each forward pair is directly followed by its reverse unless
    /// `skip_reverse`. Self-pairs are dropped. Fails with
    /// `OversizedRemoteQuery` before any retrieval when running without
    /// local evidence and the list exceeds the limit.
    pub fn generate(
        &self,
        p1s: &[Entity],
        p2s: &[Entity],
        skip_reverse: bool,
    ) -> Result<Vec<EntityPair>> {
        let mut pairs = Vec::with_capacity(p1s.len() * p2s.len() * 2);

        for p1 in p1s {
            for p2 in p2s {
                let Some(pair) = EntityPair::new(p1.clone(), p2.clone()) else {
                    tracing::debug!("Skipping self-pair {}", p1);
                    continue;
                };
                let reverse = (!skip_reverse).then(|| pair.reversed());
                pairs.push(pair);
                pairs.extend(reverse);
            }
        }

        if !self.local_evidence && pairs.len() > self.max_remote_pairs {
            return Err(PedlError::OversizedRemoteQuery {
                count: pairs.len(),
                limit: self.max_remote_pairs,
            });
        }

        Ok(pairs)
    }
}

/// Expand a name list argument
///
/// A single argument naming an existing file is read as one name per line.
pub fn read_entity_list(args: &[String]) -> Result<Vec<String>> {
    if let [single] = args {
        let path = Path::new(single);
        if path.is_file() {
            let content = std::fs::read_to_string(path).map_err(|e| PedlError::io(path, e))?;
            return Ok(content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect());
        }
    }
    Ok(args.to_vec())
}

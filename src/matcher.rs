//! Dual-key equi-join of source rows against target rows
//!
//! The primary join compares source keys with target primary keys. When the
//! target feed has block keys a second join compares source keys with them.
//! Results are concatenated: primary pairs first, then block pairs. A pair
//! found by both joins is reported twice.

use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::keys::{SourceKeys, TargetKeys};

/// Which target key produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Primary,
    Block,
}

/// One matched row pair, by row index into the source and target tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchedPair {
    pub source: usize,
    pub target: usize,
    pub kind: MatchKind,
}

/// Result of matching one source feed against one target feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    pub pairs: Vec<MatchedPair>,
    pub primary_matches: usize,
    pub block_matches: usize,
    /// Whether a block join ran at all
    pub block_join: bool,
}

impl MatchSet {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of (source, target) pairs found by both joins
    pub fn overlap(&self) -> usize {
        let primary: HashSet<(usize, usize)> = self
            .pairs
            .iter()
            .filter(|p| p.kind == MatchKind::Primary)
            .map(|p| (p.source, p.target))
            .collect();

        self.pairs
            .iter()
            .filter(|p| p.kind == MatchKind::Block && primary.contains(&(p.source, p.target)))
            .count()
    }
}

/// Inner hash join. Output follows source order, then target order.
fn hash_join(
    source: &[Option<String>],
    target: &[Option<String>],
    kind: MatchKind,
) -> Vec<MatchedPair> {
    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (row, key) in target.iter().enumerate() {
        if let Some(key) = key {
            index.entry(key.as_str()).or_default().push(row);
        }
    }

    let mut pairs = Vec::new();
    for (source_row, key) in source.iter().enumerate() {
        let Some(key) = key else { continue };
        if let Some(targets) = index.get(key.as_str()) {
            pairs.extend(targets.iter().map(|&target_row| MatchedPair {
                source: source_row,
                target: target_row,
                kind,
            }));
        }
    }
    pairs
}

/// Join source keys against target primary keys, then block keys
pub fn match_rows(source: &SourceKeys, target: &TargetKeys) -> MatchSet {
    let mut pairs = hash_join(&source.primary, &target.primary, MatchKind::Primary);
    let primary_matches = pairs.len();

    let block_matches = match &target.block {
        Some(block) => {
            let block_pairs = hash_join(&source.primary, block, MatchKind::Block);
            let count = block_pairs.len();
            pairs.extend(block_pairs);
            count
        }
        None => 0,
    };

    let matches = MatchSet {
        pairs,
        primary_matches,
        block_matches,
        block_join: target.block.is_some(),
    };

    info!(
        "Matched {} pairs ({} on primary key, {} on block key)",
        matches.len(),
        primary_matches,
        block_matches
    );

    let overlap = matches.overlap();
    if overlap > 0 {
        warn!("{} pairs matched on both primary and block keys and appear twice", overlap);
    }

    matches
}

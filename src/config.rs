//! Analyzer configuration (SPEC_FULL.md §13; spec.md §6 "Configuration
//! recognized").
//!
//! Ambient equivalent of the teacher's `Options` struct: a plain data
//! struct with a `Default` impl and `with_*` builder methods, rather than a
//! string-keyed property bag.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningMode {
    Strict,
    NonStrict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub partition_pruning: PruningMode,
    pub map_side_aggregate: bool,
    pub map_aggr_hash_memory_fraction: f64,
    pub compress_result: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            partition_pruning: PruningMode::NonStrict,
            map_side_aggregate: true,
            map_aggr_hash_memory_fraction: 0.5,
            compress_result: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition_pruning(mut self, mode: PruningMode) -> Self {
        self.partition_pruning = mode;
        self
    }

    pub fn with_map_side_aggregate(mut self, enabled: bool) -> Self {
        self.map_side_aggregate = enabled;
        self
    }

    pub fn with_map_aggr_hash_memory_fraction(mut self, fraction: f64) -> Self {
        debug_assert!(fraction > 0.0 && fraction <= 1.0);
        self.map_aggr_hash_memory_fraction = fraction;
        self
    }

    pub fn with_compress_result(mut self, enabled: bool) -> Self {
        self.compress_result = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_nonstrict_pruning() {
        let c = Config::default();
        assert_eq!(c.partition_pruning, PruningMode::NonStrict);
        assert!(c.map_side_aggregate);
    }

    #[test]
    fn builder_chain_overrides_fields() {
        let c = Config::new()
            .with_partition_pruning(PruningMode::Strict)
            .with_compress_result(true);
        assert_eq!(c.partition_pruning, PruningMode::Strict);
        assert!(c.compress_result);
    }
}

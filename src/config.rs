//! Compression configuration (ambient stack: every knob the pipeline
//! exposes lives here rather than scattered across module-local structs,
//! mirroring how the teacher exposes its few configuration points as
//! plain public fields with a `Default` impl).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::template;

/// All tunables for one `compress` call (spec §9 design notes). Defaults
/// match the spec's stated defaults.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressionConfig {
    /// Minimum number of lines a shape must match to become a template
    /// outright, before greedy absorption runs (spec §4.3).
    pub min_support: usize,
    /// Hard ceiling on distinct templates; exceeding it is an error rather
    /// than a silent truncation (spec §4.3, §7).
    pub template_ceiling: usize,
    /// Minimum per-position agreement for greedy absorption to accept a
    /// line into an existing template instead of starting a new one.
    pub absorption_threshold: f32,
    /// zstd compression level applied to every container section.
    pub entropy_level: i32,
    /// Bytes of column payload sampled to train a zstd dictionary before
    /// the entropy pass. Zero disables dictionary training.
    pub dict_train_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_support: 3,
            template_ceiling: 10_000,
            absorption_threshold: 0.8,
            entropy_level: crate::entropy::DEFAULT_LEVEL,
            dict_train_bytes: 1_048_576,
        }
    }
}

impl CompressionConfig {
    pub(crate) fn to_template_config(&self) -> template::Config {
        template::Config {
            min_support: self.min_support,
            template_ceiling: self.template_ceiling,
            absorption_threshold: self.absorption_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_spec() {
        let config = CompressionConfig::default();
        assert_eq!(config.min_support, 3);
        assert_eq!(config.template_ceiling, 10_000);
        assert!((config.absorption_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.dict_train_bytes, 1_048_576);
    }
}

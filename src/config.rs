//! Runtime configuration.
//!
//! Every tunable of the store, the attention model, the evaluator and the agent driver
//! lives in [`RuntimeConfig`]. Values are layered: built-in defaults, then an optional
//! TOML file, then `ATOMCLAD_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AtomcladError, Result};

/// Name of the environment variable pointing at a config file.
pub const CONFIG_ENV: &str = "ATOMCLAD_CONFIG";
/// Config file picked up from the working directory when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "atomclad.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    // truth
    /// Evidence count at which confidence reaches one half.
    pub confidence_sensitivity: f64,
    pub default_truth_strength: f64,
    pub default_truth_count: f64,

    // attention
    pub default_sti: f64,
    pub default_lti: f64,
    /// Fraction of short-term importance lost per maintenance tick.
    pub sti_decay: f64,
    /// Fraction of long-term importance lost per maintenance tick.
    pub lti_decay: f64,
    /// Share of the short-term decay that long-term importance absorbs.
    pub lti_absorption: f64,
    /// Boost applied when an existing atom is added again.
    pub access_boost: f64,
    /// Boost applied on a successful `get`.
    pub get_boost: f64,
    /// Scale of the boost applied per unit of confidence gained by a revision.
    pub revision_boost: f64,
    /// Confidence change below which a revision does not boost.
    pub revision_threshold: f64,
    /// Ticks after which the recency factor of short-term importance halves.
    pub recency_half_life: f64,

    // forgetting
    pub min_retention: f64,
    pub high_water: usize,
    /// Fraction of `high_water` the store is evicted down to under pressure.
    pub target_fraction: f64,
    /// Share of the store that must be eligible before an opportunistic eviction runs.
    pub opportunistic_fraction: f64,

    // maintenance
    pub maintenance_interval_ms: u64,
    pub latency_rebuild_threshold_us: u64,

    // evaluation and query
    pub max_depth: usize,
    pub max_results: usize,
    pub max_query_results: usize,
    pub max_candidates: usize,
    pub min_match_confidence: f64,

    // agent
    pub max_cycles: usize,

    /// SQLite file used for snapshots, if any.
    pub persistence: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            confidence_sensitivity: 1.0,
            default_truth_strength: 1.0,
            default_truth_count: 1.0,
            default_sti: 0.5,
            default_lti: 0.1,
            sti_decay: 0.1,
            lti_decay: 0.01,
            lti_absorption: 0.05,
            access_boost: 0.02,
            get_boost: 0.05,
            revision_boost: 1.0,
            revision_threshold: 0.05,
            recency_half_life: 50.0,
            min_retention: 0.01,
            high_water: 100_000,
            target_fraction: 0.8,
            opportunistic_fraction: 0.25,
            maintenance_interval_ms: 1000,
            latency_rebuild_threshold_us: 5000,
            max_depth: 64,
            max_results: 32,
            max_query_results: 1024,
            max_candidates: 100_000,
            min_match_confidence: 0.0,
            max_cycles: 100,
            persistence: None,
        }
    }
}

impl RuntimeConfig {
    /// Load config from file and environment. Precedence: env `ATOMCLAD_*` > file named by
    /// `ATOMCLAD_CONFIG` (or `atomclad.toml`) > defaults.
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };
        let built = builder
            .add_source(
                config::Environment::with_prefix("ATOMCLAD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let loaded: RuntimeConfig = built.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("default_truth_strength", self.default_truth_strength),
            ("default_sti", self.default_sti),
            ("default_lti", self.default_lti),
            ("sti_decay", self.sti_decay),
            ("lti_decay", self.lti_decay),
            ("lti_absorption", self.lti_absorption),
            ("access_boost", self.access_boost),
            ("get_boost", self.get_boost),
            ("target_fraction", self.target_fraction),
            ("opportunistic_fraction", self.opportunistic_fraction),
            ("min_match_confidence", self.min_match_confidence),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(AtomcladError::Config(format!("{name} must lie in [0, 1], got {value}")));
            }
        }
        if !(self.confidence_sensitivity > 0.0) {
            return Err(AtomcladError::Config("confidence_sensitivity must be positive".into()));
        }
        if !(self.recency_half_life > 0.0) {
            return Err(AtomcladError::Config("recency_half_life must be positive".into()));
        }
        if self.default_truth_count < 0.0 || self.revision_boost < 0.0 || self.min_retention < 0.0 {
            return Err(AtomcladError::Config(
                "default_truth_count, revision_boost and min_retention must not be negative".into(),
            ));
        }
        if self.max_depth == 0 || self.max_results == 0 || self.max_query_results == 0 {
            return Err(AtomcladError::Config(
                "max_depth, max_results and max_query_results must be at least 1".into(),
            ));
        }
        if self.high_water == 0 {
            return Err(AtomcladError::Config("high_water must be at least 1".into()));
        }
        Ok(())
    }
}

//! TOML configuration parsing.
//!
//! Only `[corpus]` and `[server]` are required; every other section falls
//! back to defaults. See `config/spectra.example.toml` for a full example.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::index::IndexSettings;
use crate::search::RankingParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Non-empty => the default scope is this subset of groups.
    #[serde(default)]
    pub active_groups: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_canonical_globs")]
    pub canonical_globs: Vec<String>,
    #[serde(default = "default_deprecated_globs")]
    pub deprecated_globs: Vec<String>,
    #[serde(default = "default_root_globs")]
    pub root_globs: Vec<String>,
    #[serde(default = "default_seed_globs")]
    pub seed_globs: Vec<String>,
    #[serde(default = "default_journal_globs")]
    pub journal_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}
fn default_canonical_globs() -> Vec<String> {
    vec!["**/canon/**".to_string(), "**/*.canon.md".to_string()]
}
fn default_deprecated_globs() -> Vec<String> {
    vec!["**/deprecated/**".to_string(), "**/*.old.md".to_string()]
}
fn default_root_globs() -> Vec<String> {
    vec!["**/README.md".to_string(), "**/root.md".to_string()]
}
fn default_seed_globs() -> Vec<String> {
    vec!["**/seeds/**".to_string(), "**/seed*.md".to_string()]
}
fn default_journal_globs() -> Vec<String> {
    vec!["**/journal/**".to_string(), "**/log*.md".to_string()]
}

impl CorpusConfig {
    /// A corpus rooted at `root` with every other field at its default.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            active_groups: Vec::new(),
            follow_symlinks: false,
            canonical_globs: default_canonical_globs(),
            deprecated_globs: default_deprecated_globs(),
            root_globs: default_root_globs(),
            seed_globs: default_seed_globs(),
            journal_globs: default_journal_globs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_max_tokens() -> usize {
    400
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_anchor_k")]
    pub anchor_k: usize,
    #[serde(default = "default_confuser_k")]
    pub confuser_k: usize,
    #[serde(default = "default_anchor_fallback_threshold")]
    pub anchor_fallback_threshold: usize,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
}

fn default_anchor_k() -> usize {
    5
}
fn default_confuser_k() -> usize {
    4
}
fn default_anchor_fallback_threshold() -> usize {
    500
}
fn default_bm25_k1() -> f64 {
    1.2
}
fn default_bm25_b() -> f64 {
    0.75
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            anchor_k: default_anchor_k(),
            confuser_k: default_confuser_k(),
            anchor_fallback_threshold: default_anchor_fallback_threshold(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_entity_boost")]
    pub entity_boost: f64,
    #[serde(default = "default_anchor_weight")]
    pub anchor_weight: f64,
    #[serde(default = "default_neighbor_weight")]
    pub neighbor_weight: f64,
    #[serde(default = "default_neighbor_radius")]
    pub neighbor_radius: usize,
}

fn default_top_n() -> usize {
    8
}
fn default_entity_boost() -> f64 {
    1.3
}
fn default_anchor_weight() -> f64 {
    15.0
}
fn default_neighbor_weight() -> f64 {
    10.0
}
fn default_neighbor_radius() -> usize {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            entity_boost: default_entity_boost(),
            anchor_weight: default_anchor_weight(),
            neighbor_weight: default_neighbor_weight(),
            neighbor_radius: default_neighbor_radius(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    #[serde(default = "default_orphan_threshold")]
    pub orphan_threshold: f64,
    #[serde(default = "default_weak_coverage_threshold")]
    pub weak_coverage_threshold: f64,
    /// Default cap on duplicate and orphan report length.
    #[serde(default = "default_report_limit")]
    pub top_n: usize,
}

fn default_duplicate_threshold() -> f64 {
    0.75
}
fn default_orphan_threshold() -> f64 {
    0.25
}
fn default_weak_coverage_threshold() -> f64 {
    0.1
}
fn default_report_limit() -> usize {
    20
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: default_duplicate_threshold(),
            orphan_threshold: default_orphan_threshold(),
            weak_coverage_threshold: default_weak_coverage_threshold(),
            top_n: default_report_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_watcher_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_watcher_enabled() -> bool {
    true
}
fn default_interval_ms() -> u64 {
    2000
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_watcher_enabled(),
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// A config with defaults everywhere, indexing `root`.
    pub fn minimal(root: impl Into<PathBuf>) -> Self {
        Self {
            corpus: CorpusConfig::with_root(root),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            maintenance: MaintenanceConfig::default(),
            watcher: WatcherConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:7341".to_string(),
            },
        }
    }

    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            anchor_k: self.index.anchor_k,
            confuser_k: self.index.confuser_k,
            anchor_fallback_threshold: self.index.anchor_fallback_threshold,
        }
    }

    pub fn ranking_params(&self) -> RankingParams {
        RankingParams {
            bm25_k1: self.index.bm25_k1,
            bm25_b: self.index.bm25_b,
            entity_boost: self.retrieval.entity_boost,
            anchor_weight: self.retrieval.anchor_weight,
            neighbor_weight: self.retrieval.neighbor_weight,
            neighbor_radius: self.retrieval.neighbor_radius,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    if config.index.anchor_k == 0 {
        bail!("index.anchor_k must be > 0");
    }
    if config.index.confuser_k == 0 {
        bail!("index.confuser_k must be > 0");
    }
    if config.index.bm25_k1 < 0.0 {
        bail!("index.bm25_k1 must be >= 0.0");
    }
    if !(0.0..=1.0).contains(&config.index.bm25_b) {
        bail!("index.bm25_b must be in [0.0, 1.0]");
    }

    if config.retrieval.top_n == 0 {
        bail!("retrieval.top_n must be >= 1");
    }
    if config.retrieval.entity_boost <= 0.0 {
        bail!("retrieval.entity_boost must be > 0.0");
    }

    if config.maintenance.top_n == 0 {
        bail!("maintenance.top_n must be >= 1");
    }
    for (name, value) in [
        ("maintenance.duplicate_threshold", config.maintenance.duplicate_threshold),
        ("maintenance.orphan_threshold", config.maintenance.orphan_threshold),
        ("maintenance.weak_coverage_threshold", config.maintenance.weak_coverage_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    if config.watcher.interval_ms == 0 {
        bail!("watcher.interval_ms must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[corpus]
root = "./notes"

[server]
bind = "127.0.0.1:7341"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.index.anchor_k, 5);
        assert_eq!(config.retrieval.top_n, 8);
        assert_eq!(config.watcher.interval_ms, 2000);
        assert_eq!(config.maintenance.duplicate_threshold, 0.75);
        assert_eq!(config.corpus.include_globs, vec!["**/*.md", "**/*.txt"]);
    }

    #[test]
    fn test_overrides_are_read() {
        let text = format!(
            "{}\n[index]\nanchor_fallback_threshold = 50\n\n[retrieval]\nentity_boost = 2.0\n",
            MINIMAL
        );
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.index_settings().anchor_fallback_threshold, 50);
        assert_eq!(config.ranking_params().entity_boost, 2.0);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let text = format!("{}\n[maintenance]\norphan_threshold = 1.5\n", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("orphan_threshold"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let text = format!("{}\n[watcher]\ninterval_ms = 0\n", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_corpus_fails_to_parse() {
        let result: std::result::Result<Config, _> = toml::from_str("[server]\nbind = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/spectra.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.maintenance.top_n, 20);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

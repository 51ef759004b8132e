//! TOML configuration: data source locations, cache location, the related
//! major allowlist, and output defaults.
//!
//! Every key has a default, so an empty file (or [`Config::with_root`])
//! yields the standard `db/` layout.

use anyhow::{Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub majors: MajorsConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Base directory; relative paths below are resolved against it.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_institution_json")]
    pub institution_json: PathBuf,
    #[serde(default = "default_questionnaire_xlsx")]
    pub questionnaire_xlsx: PathBuf,
    #[serde(default = "default_school_dir")]
    pub school_dir: PathBuf,
    #[serde(default = "default_school_file_pattern")]
    pub school_file_pattern: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            institution_json: default_institution_json(),
            questionnaire_xlsx: default_questionnaire_xlsx(),
            school_dir: default_school_dir(),
            school_file_pattern: default_school_file_pattern(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./db")
}
fn default_institution_json() -> PathBuf {
    PathBuf::from("托育机构平台注册备案数据.json")
}
fn default_questionnaire_xlsx() -> PathBuf {
    PathBuf::from("问卷星统计_托育机构人才需求专项调查_20260120.xlsx")
}
fn default_school_dir() -> PathBuf {
    PathBuf::from("托育学校注册备案数据")
}
fn default_school_file_pattern() -> String {
    "moe_majors_*.txt".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_file")]
    pub file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            file: default_cache_file(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("_stats_cache")
}
fn default_cache_file() -> String {
    "cache.json".to_string()
}

/// Majors counted as childcare-related when a query names no major.
#[derive(Debug, Deserialize, Clone)]
pub struct MajorsConfig {
    #[serde(default = "default_major_codes")]
    pub codes: Vec<String>,
    #[serde(default = "default_major_names")]
    pub names: Vec<String>,
}

impl Default for MajorsConfig {
    fn default() -> Self {
        Self {
            codes: default_major_codes(),
            names: default_major_names(),
        }
    }
}

// 520802 婴幼儿托育服务与管理, 570101K 早期教育, 660225 早期教育 (older catalogue)
fn default_major_codes() -> Vec<String> {
    vec![
        "520802".to_string(),
        "570101K".to_string(),
        "660225".to_string(),
    ]
}
fn default_major_names() -> Vec<String> {
    vec![
        "婴幼儿托育服务与管理".to_string(),
        "早期教育".to_string(),
        "托育".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_details_limit")]
    pub details_limit: usize,
    #[serde(default = "default_demand_details_limit")]
    pub demand_details_limit: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            details_limit: default_details_limit(),
            demand_details_limit: default_demand_details_limit(),
        }
    }
}

fn default_details_limit() -> usize {
    50
}
fn default_demand_details_limit() -> usize {
    10
}

impl Config {
    /// Default layout rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.data.root = root.into();
        config
    }

    pub fn institution_path(&self) -> PathBuf {
        self.resolve(&self.data.institution_json)
    }

    pub fn questionnaire_path(&self) -> PathBuf {
        self.resolve(&self.data.questionnaire_xlsx)
    }

    pub fn school_dir(&self) -> PathBuf {
        self.resolve(&self.data.school_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.resolve(&self.cache.dir).join(&self.cache.file)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data.root.join(path)
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let raw: toml::Table =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    let root_given = raw
        .get("data")
        .and_then(|data| data.get("root"))
        .is_some();
    let mut config: Config = toml::Value::Table(raw)
        .try_into()
        .with_context(|| "Failed to parse config file")?;

    // An explicit relative data root is taken relative to the config file's
    // directory. An omitted root keeps the working-directory default, the
    // same as running without a config file.
    if root_given && config.data.root.is_relative() {
        if let Some(parent) = path.parent() {
            config.data.root = parent.join(&config.data.root);
        }
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let pattern = &config.data.school_file_pattern;
    if !pattern.contains('*') {
        anyhow::bail!(
            "data.school_file_pattern must contain '*' (got '{}')",
            pattern
        );
    }
    Glob::new(pattern)
        .with_context(|| format!("data.school_file_pattern is not a valid glob: {}", pattern))?;

    if config.cache.file.trim().is_empty() {
        anyhow::bail!("cache.file must not be empty");
    }

    Ok(())
}

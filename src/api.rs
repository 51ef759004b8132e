//! Entry points: cached stats queries and talent-demand extraction.
//!
//! [`StatsApi::get_stats`] checks the cache first and only recomputes on a
//! miss (or when caching is disabled). The response always carries the
//! fingerprints current at call time, so a caller can tell which source
//! state a cached result was validated against.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheStore, JsonFileCacheStore, StatsCache};
use crate::config::Config;
use crate::demand::{extract_talent_demand, DemandOptions, TalentDemand};
use crate::fingerprint::{DataSources, Fingerprints};
use crate::loader::{load_questionnaire, load_questionnaire_columns};
use crate::models::{StatsQuery, StatsResult};
use crate::stats::compute_stats;

#[derive(Debug, Clone)]
pub struct StatsOptions {
    /// Cap on each details list.
    pub details_limit: usize,
    pub use_cache: bool,
    /// When false, the questionnaire blocks are left out of `details`.
    pub include_questionnaire_details: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            details_limit: 50,
            use_cache: true,
            include_questionnaire_details: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub from_cache: bool,
    pub fingerprints: Fingerprints,
}

/// `{stats, details, meta}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub result: StatsResult,
    pub meta: Meta,
}

pub struct StatsApi {
    config: Config,
    cache: StatsCache,
}

impl StatsApi {
    /// Uses the JSON cache file named by `config.cache`.
    pub fn from_config(config: Config) -> Self {
        let store = JsonFileCacheStore::new(config.cache_path());
        Self::with_store(config, Box::new(store))
    }

    pub fn with_store(config: Config, store: Box<dyn CacheStore>) -> Self {
        let cache = StatsCache::new(store, DataSources::from_config(&config));
        Self { config, cache }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &StatsCache {
        &self.cache
    }

    pub fn get_stats(&self, query: &StatsQuery, options: &StatsOptions) -> Result<StatsResponse> {
        if options.use_cache {
            if let Some(result) = self.cache.get_cached(query) {
                tracing::info!("stats served from cache");
                return Ok(self.respond(result, true, options));
            }
            tracing::info!("stats cache miss");
        }

        let result = compute_stats(
            self.cache.sources(),
            &self.config.majors,
            query,
            options.details_limit,
        )?;

        if options.use_cache {
            if let Err(e) = self.cache.set_cached(query, &result) {
                tracing::warn!(error = %e, "failed to write stats cache");
            }
        }

        Ok(self.respond(result, false, options))
    }

    fn respond(&self, mut result: StatsResult, from_cache: bool, options: &StatsOptions) -> StatsResponse {
        if !options.include_questionnaire_details {
            result.details.questionnaire_posting = None;
            result.details.questionnaire_details_sample = None;
        }
        StatsResponse {
            result,
            meta: Meta {
                from_cache,
                fingerprints: self.cache.current_fingerprints(),
            },
        }
    }

    /// Talent demand over the questionnaire. Never cached.
    pub fn get_talent_demand(&self, options: &DemandOptions) -> TalentDemand {
        let rows = load_questionnaire(&self.cache.sources().questionnaire_xlsx);
        extract_talent_demand(&rows, options)
    }

    pub fn fingerprints(&self) -> Fingerprints {
        self.cache.current_fingerprints()
    }

    pub fn questionnaire_columns(&self) -> Vec<String> {
        load_questionnaire_columns(&self.cache.sources().questionnaire_xlsx)
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_root(tmp.path());
        fs::write(
            config.institution_path(),
            r#"[
                {"institution_name": "广州市阳光托育有限公司", "zoning_name": "广东省广州市天河区", "institution_type": "营利性"},
                {"institution_name": "合肥市蓓蕾托育中心", "zoning_name": "安徽省合肥市蜀山区", "institution_type": "事业单位"}
            ]"#,
        )
        .unwrap();
        fs::create_dir_all(config.school_dir()).unwrap();
        fs::write(
            config.school_dir().join("moe_majors_广东省_2023.txt"),
            "机构名称：广东某职业学院\n省份：广东省\n开设专业：婴幼儿托育服务与管理(520802)\n修业年限：3\n年份：2023\n^_^\n",
        )
        .unwrap();
        (tmp, config)
    }

    fn guangdong() -> StatsQuery {
        StatsQuery {
            region: Some("广东省".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn second_identical_query_is_served_from_cache() {
        let (_tmp, config) = fixture();
        let api = StatsApi::with_store(config, Box::new(InMemoryCacheStore::new()));
        let first = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
        let second = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
        assert!(!first.meta.from_cache);
        assert!(second.meta.from_cache);
        assert_eq!(first.result, second.result);
        assert_eq!(first.meta.fingerprints, second.meta.fingerprints);
    }

    #[test]
    fn computed_stats_reflect_region() {
        let (_tmp, config) = fixture();
        let api = StatsApi::with_store(config, Box::new(InMemoryCacheStore::new()));
        let response = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
        let stats = &response.result.stats;
        assert_eq!(stats.region.institution_count, 1);
        assert_eq!(stats.national.institution_count, 2);
        assert_eq!(stats.region.school_count, 1);
        assert_eq!(response.result.details.institutions.len(), 1);
    }

    #[test]
    fn disabled_cache_always_recomputes() {
        let (_tmp, config) = fixture();
        let api = StatsApi::with_store(config, Box::new(InMemoryCacheStore::new()));
        let options = StatsOptions {
            use_cache: false,
            ..Default::default()
        };
        api.get_stats(&guangdong(), &options).unwrap();
        let again = api.get_stats(&guangdong(), &options).unwrap();
        assert!(!again.meta.from_cache);
        assert!(api.cache().store().is_empty());
    }

    #[test]
    fn questionnaire_details_can_be_left_out() {
        let (_tmp, config) = fixture();
        let api = StatsApi::with_store(config, Box::new(InMemoryCacheStore::new()));
        let options = StatsOptions {
            include_questionnaire_details: false,
            ..Default::default()
        };
        let response = api.get_stats(&guangdong(), &options).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["details"].get("questionnaire_posting").is_none());
        assert!(json["details"].get("questionnaire_details_sample").is_none());
        assert_eq!(json["meta"]["from_cache"], false);

        // The cached copy still has them.
        let full = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
        assert!(full.meta.from_cache);
        assert!(full.result.details.questionnaire_posting.is_some());
    }

    #[test]
    fn malformed_registry_is_an_error() {
        let (_tmp, config) = fixture();
        fs::write(config.institution_path(), "{ broken").unwrap();
        let api = StatsApi::with_store(config, Box::new(InMemoryCacheStore::new()));
        assert!(api.get_stats(&guangdong(), &StatsOptions::default()).is_err());
    }

    #[test]
    fn demand_without_questionnaire_is_empty() {
        let (_tmp, config) = fixture();
        let api = StatsApi::from_config(config);
        let demand = api.get_talent_demand(&DemandOptions::default());
        assert_eq!(demand.sample_count, 0);
        assert!(api.questionnaire_columns().is_empty());
        api.clear_cache().unwrap();
    }
}

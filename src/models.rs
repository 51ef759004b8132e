//! Core data types that flow through the loading, filtering, aggregation and
//! caching stages.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Flat count distribution (`key -> count`).
pub type Distribution = BTreeMap<String, u64>;

/// Two-level distribution (`outer -> inner -> count`).
pub type NestedDistribution = BTreeMap<String, Distribution>;

/// Insertion-ordered string-keyed map.
///
/// Serializes as a JSON object whose key order is the insertion order.
/// Used where output order carries meaning: spreadsheet columns and
/// frequency-sorted demand tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces in place; a replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps only entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    /// Stable sort by value; equal values keep their insertion order.
    pub fn sort_by_value<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&V, &V) -> std::cmp::Ordering,
    {
        self.entries.sort_by(|a, b| cmp(&a.1, &b.1));
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// One questionnaire response: column name -> trimmed cell text.
pub type QuestionnaireRow = OrderedMap<String>;

/// One entry of the institution registry.
///
/// Also used as the projected detail record in stats output, where absent
/// fields serialize as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstitutionRecord {
    pub institution_name: Option<String>,
    pub institution_other_name: Option<String>,
    pub zoning_name: Option<String>,
    pub institution_type: Option<String>,
    pub address: Option<String>,
}

impl InstitutionRecord {
    /// Builds a record from a registry JSON object, coercing scalar values to
    /// text. Nulls, arrays and objects leave the field absent.
    pub fn from_json(obj: &serde_json::Map<String, serde_json::Value>) -> Self {
        let field = |key: &str| obj.get(key).and_then(scalar_text);
        Self {
            institution_name: field("institution_name"),
            institution_other_name: field("institution_other_name"),
            zoning_name: field("zoning_name"),
            institution_type: field("institution_type"),
            address: field("address"),
        }
    }

    pub fn name(&self) -> &str {
        self.institution_name.as_deref().unwrap_or("")
    }

    pub fn other_name(&self) -> &str {
        self.institution_other_name.as_deref().unwrap_or("")
    }

    pub fn zoning(&self) -> &str {
        self.zoning_name.as_deref().unwrap_or("")
    }
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub const FIELD_INSTITUTION: &str = "机构名称";
pub const FIELD_PROVINCE: &str = "省份";
pub const FIELD_MAJOR: &str = "开设专业";
pub const FIELD_PROGRAM_YEARS: &str = "修业年限";
pub const FIELD_YEAR: &str = "年份";

/// One school/major registration parsed from a flat-text block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchoolRecord {
    pub fields: BTreeMap<String, String>,
    /// File name the record was read from.
    pub source_file: String,
}

impl SchoolRecord {
    /// Field value, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn institution(&self) -> &str {
        self.get(FIELD_INSTITUTION)
    }

    pub fn province(&self) -> &str {
        self.get(FIELD_PROVINCE)
    }

    pub fn major(&self) -> &str {
        self.get(FIELD_MAJOR)
    }

    pub fn program_years(&self) -> &str {
        self.get(FIELD_PROGRAM_YEARS)
    }

    pub fn year(&self) -> &str {
        self.get(FIELD_YEAR)
    }

    pub fn detail(&self) -> SchoolDetail {
        let field = |key: &str| self.fields.get(key).cloned();
        SchoolDetail {
            institution: field(FIELD_INSTITUTION),
            province: field(FIELD_PROVINCE),
            major: field(FIELD_MAJOR),
            program_years: field(FIELD_PROGRAM_YEARS),
            year: field(FIELD_YEAR),
        }
    }
}

/// Projected school record for the details block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolDetail {
    #[serde(rename = "机构名称")]
    pub institution: Option<String>,
    #[serde(rename = "省份")]
    pub province: Option<String>,
    #[serde(rename = "开设专业")]
    pub major: Option<String>,
    #[serde(rename = "修业年限")]
    pub program_years: Option<String>,
    #[serde(rename = "年份")]
    pub year: Option<String>,
}

/// Query parameters of a stats request. Every field is optional; an absent
/// field means "no filter" for that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsQuery {
    pub school: Option<String>,
    pub major: Option<String>,
    pub region: Option<String>,
    pub education_level: Option<String>,
    /// Lower bound on the record year.
    pub started_time: Option<i64>,
}

/// Filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Region,
    National,
}

pub const INFERRED_NOTE: &str = "普惠、服务模式按名称关键词推断，仅供参考";

/// Counts and distributions for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    pub institution_count: u64,
    pub city_distribution: NestedDistribution,
    pub host_type_distribution: Distribution,
    pub puhui_distribution: Distribution,
    pub service_mode_distribution: Distribution,
    #[serde(rename = "_inferred_note")]
    pub inferred_note: String,
    /// Matching school records (one per program length and year).
    pub school_count: u64,
    /// Distinct (institution, major, year) combinations.
    #[serde(default)]
    pub training_point_count: u64,
    /// Distinct (institution, year) pairs.
    #[serde(default)]
    pub institution_year_count: u64,
    pub school_distribution: Distribution,
    pub posting_sample_count: u64,
    pub matched_institution_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedStats {
    pub region: RegionStats,
    pub national: RegionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationCounts {
    pub region_matched_count: u64,
    pub national_matched_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsDetails {
    pub institutions: Vec<InstitutionRecord>,
    pub schools: Vec<SchoolDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire_posting: Option<Distribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire_details_sample: Option<Vec<QuestionnaireRow>>,
    pub cross_validation: CrossValidationCounts,
}

/// Output of one stats computation; this is the value stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub stats: ScopedStats,
    pub details: StatsDetails,
}

//! Region, major, year and education-level filtering, and deduplication.
//!
//! Filters never fail and never reorder: output is always a stable
//! subsequence of the input.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::config::MajorsConfig;
use crate::models::{InstitutionRecord, QuestionnaireRow, SchoolRecord, Scope, FIELD_YEAR};
use crate::zoning::parse_zoning;

/// Questionnaire columns that may hold a province or city.
pub const DEFAULT_REGION_COLUMNS: [&str; 5] = ["省份", "城市", "所在地区", "地区", "区域"];

/// Keeps institutions located in `region` (province, city, full zoning
/// string, or zoning prefix). National scope or no region keeps all.
pub fn filter_institutions(
    data: &[InstitutionRecord],
    region: Option<&str>,
    scope: Scope,
) -> Vec<InstitutionRecord> {
    let region = match (scope, region) {
        (Scope::Region, Some(r)) if !r.is_empty() => r.trim(),
        _ => return data.to_vec(),
    };
    data.iter()
        .filter(|item| {
            let zoning = item.zoning();
            let (province, city) = parse_zoning(zoning);
            region == province || region == city || region == zoning || zoning.starts_with(region)
        })
        .cloned()
        .collect()
}

/// Conjunctive school filter.
#[derive(Debug, Clone, Copy)]
pub struct SchoolFilter<'a> {
    /// Province; only applied in region scope.
    pub region: Option<&'a str>,
    /// Major name or code; `None` means any related major.
    pub major: Option<&'a str>,
    pub year_from: Option<i64>,
    pub education_level: Option<&'a str>,
    pub scope: Scope,
    pub majors: &'a MajorsConfig,
}

pub fn filter_schools(data: &[SchoolRecord], filter: &SchoolFilter<'_>) -> Vec<SchoolRecord> {
    data.iter()
        .filter(|item| school_matches(item, filter))
        .cloned()
        .collect()
}

fn school_matches(item: &SchoolRecord, filter: &SchoolFilter<'_>) -> bool {
    if filter.scope == Scope::Region {
        if let Some(region) = filter.region.filter(|r| !r.is_empty()) {
            if item.province() != region {
                return false;
            }
        }
    }
    if !major_matches(item.major(), filter.major, filter.majors) {
        return false;
    }
    if !year_passes(item, filter.year_from) {
        return false;
    }
    match filter.education_level.filter(|l| !l.is_empty()) {
        Some(level) => education_level_matches(item.program_years(), level),
        None => true,
    }
}

fn major_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\((\d+K?)\)").expect("static regex"))
}

/// Major match against a record's `开设专业`. An explicit major matches by
/// substring or by the code in parentheses; otherwise any related code or
/// name matches.
pub fn major_matches(offered: &str, major: Option<&str>, majors: &MajorsConfig) -> bool {
    if offered.is_empty() {
        return false;
    }
    if let Some(major) = major.filter(|m| !m.is_empty()) {
        if offered.contains(major) {
            return true;
        }
        return major_code_pattern()
            .captures(offered)
            .and_then(|caps| caps.get(1))
            .is_some_and(|code| code.as_str() == major);
    }
    majors.codes.iter().any(|code| offered.contains(code.as_str()))
        || majors.names.iter().any(|name| offered.contains(name.as_str()))
}

/// Year lower bound. A missing year counts as 0; a year that is present but
/// not an integer always passes.
pub fn year_passes(item: &SchoolRecord, year_from: Option<i64>) -> bool {
    let Some(from) = year_from else {
        return true;
    };
    let year = if item.has(FIELD_YEAR) {
        match item.year().trim().parse::<i64>() {
            Ok(y) => y,
            Err(_) => return true,
        }
    } else {
        0
    };
    year >= from
}

/// Education level via program length: 本科 needs 4 or 5 years, 专科 needs 2
/// or 3. Other levels impose no constraint.
pub fn education_level_matches(program_years: &str, level: &str) -> bool {
    let years = program_years.trim();
    if level.contains("本科") && !matches!(years, "4" | "5") {
        return false;
    }
    if level.contains("专科") && !matches!(years, "2" | "3") {
        return false;
    }
    true
}

/// Training points: dedup by (institution, major, year), first wins.
pub fn unique_schools(data: &[SchoolRecord]) -> Vec<SchoolRecord> {
    let mut seen: HashSet<(&str, &str, &str)> = HashSet::new();
    data.iter()
        .filter(|item| seen.insert((item.institution(), item.major(), item.year())))
        .cloned()
        .collect()
}

/// Institution-years: dedup by (institution, year) regardless of program
/// length; records without an institution name are dropped.
pub fn unique_schools_by_institution(data: &[SchoolRecord]) -> Vec<SchoolRecord> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    data.iter()
        .filter(|item| {
            let name = item.institution().trim();
            !name.is_empty() && seen.insert((name, item.year()))
        })
        .cloned()
        .collect()
}

/// Strips province/city designators for loose matching (广东省 ~ 广东).
fn strip_designators(s: &str) -> String {
    s.replace(['省', '市'], "").trim().to_string()
}

/// Keeps rows whose region columns mention `region`. When nothing matches
/// the original rows are returned unchanged.
pub fn filter_questionnaire_by_region(
    data: &[QuestionnaireRow],
    region: Option<&str>,
    region_columns: Option<&[&str]>,
) -> Vec<QuestionnaireRow> {
    let region = match region {
        Some(r) if !r.is_empty() => r,
        _ => return data.to_vec(),
    };
    if data.is_empty() {
        return Vec::new();
    }
    let columns = region_columns.unwrap_or(&DEFAULT_REGION_COLUMNS);
    let region_norm = strip_designators(region);

    let cell_matches = |cell: &str| -> bool {
        let s = cell.trim();
        if s.is_empty() {
            return false;
        }
        if region.contains(s) || s.contains(region) {
            return true;
        }
        let cell_norm = strip_designators(s);
        !region_norm.is_empty()
            && (region_norm.contains(cell_norm.as_str()) || cell_norm.contains(region_norm.as_str()))
    };

    let matched: Vec<QuestionnaireRow> = data
        .iter()
        .filter(|row| {
            columns
                .iter()
                .any(|col| row.get(col).is_some_and(|v| cell_matches(v)))
        })
        .cloned()
        .collect();

    if matched.is_empty() {
        tracing::debug!(region, "no questionnaire rows matched region; keeping all rows");
        data.to_vec()
    } else {
        matched
    }
}

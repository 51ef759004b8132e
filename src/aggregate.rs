//! Distribution builders and cross-source validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::classify::{infer_host_type, infer_is_puhui, infer_service_modes};
use crate::models::{Distribution, InstitutionRecord, NestedDistribution, QuestionnaireRow, SchoolRecord};
use crate::zoning::parse_zoning;

/// Questionnaire columns that may hold an institution name.
pub const DEFAULT_NAME_COLUMNS: [&str; 5] = ["机构名称", "单位名称", "机构名", "单位", "名称"];
/// Questionnaire columns that may hold the most-needed posting.
pub const POSTING_COLUMNS: [&str; 5] = ["最缺岗位", "岗位", "紧缺岗位", "需求岗位", "岗位需求"];

const MATCHED_DETAILS_CAP: usize = 100;
const UNMATCHED_SAMPLE_CAP: usize = 20;
const POSTING_SAMPLE_CAP: usize = 50;

fn bump(dist: &mut Distribution, key: &str) {
    *dist.entry(key.to_string()).or_insert(0) += 1;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstitutionDistributions {
    pub city: NestedDistribution,
    pub host_type: Distribution,
    pub puhui: Distribution,
    pub service_mode: Distribution,
}

/// City (province → city), host type, puhui and service-mode counts.
/// Records without a parsable province are left out of the city
/// distribution only; a province without a city counts under itself.
pub fn institution_distributions(data: &[InstitutionRecord]) -> InstitutionDistributions {
    let mut out = InstitutionDistributions::default();
    for item in data {
        let (province, city) = parse_zoning(item.zoning());
        if !province.is_empty() {
            let key = if city.is_empty() { &province } else { &city };
            bump(out.city.entry(province.clone()).or_default(), key);
        }
        bump(&mut out.host_type, infer_host_type(item));
        bump(&mut out.puhui, infer_is_puhui(item));
        for mode in infer_service_modes(item) {
            bump(&mut out.service_mode, mode);
        }
    }
    out
}

/// Schools by province; records without a province are not counted.
pub fn school_distribution(data: &[SchoolRecord]) -> Distribution {
    let mut dist = Distribution::new();
    for item in data {
        let province = item.province().trim();
        if !province.is_empty() {
            bump(&mut dist, province);
        }
    }
    dist
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub matched_count: u64,
    pub unmatched_count: u64,
    /// First 100 matched rows in input order.
    pub matched_details: Vec<QuestionnaireRow>,
    /// First 20 unmatched rows in input order.
    pub unmatched_sample: Vec<QuestionnaireRow>,
}

/// Matches questionnaire rows to registered institutions by exact name or
/// alias. The first candidate column whose value is a known name decides.
pub fn cross_validate_institutions(
    inst_data: &[InstitutionRecord],
    questionnaire: &[QuestionnaireRow],
    name_columns: Option<&[&str]>,
) -> CrossValidation {
    let columns = name_columns.unwrap_or(&DEFAULT_NAME_COLUMNS);
    let known: HashSet<&str> = inst_data
        .iter()
        .flat_map(|x| [x.name().trim(), x.other_name().trim()])
        .filter(|n| !n.is_empty())
        .collect();

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for row in questionnaire {
        let found = columns.iter().any(|col| {
            row.get(col)
                .map(|v| v.trim())
                .is_some_and(|v| !v.is_empty() && known.contains(v))
        });
        if found {
            matched.push(row);
        } else {
            unmatched.push(row);
        }
    }

    CrossValidation {
        matched_count: matched.len() as u64,
        unmatched_count: unmatched.len() as u64,
        matched_details: matched.into_iter().take(MATCHED_DETAILS_CAP).cloned().collect(),
        unmatched_sample: unmatched.into_iter().take(UNMATCHED_SAMPLE_CAP).cloned().collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostingStats {
    pub posting_distribution: Distribution,
    pub sample_count: u64,
    /// Up to 50 rows with empty cells dropped.
    pub details_sample: Vec<QuestionnaireRow>,
}

/// First non-empty value among `columns`, trimmed.
pub fn first_existing<'a>(columns: &[&str], row: &'a QuestionnaireRow) -> Option<&'a str> {
    columns
        .iter()
        .filter_map(|col| row.get(col))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

/// Copy of `row` without empty cells.
pub fn non_empty_cells(row: &QuestionnaireRow) -> QuestionnaireRow {
    let mut out = row.clone();
    out.retain(|_, v| !v.trim().is_empty());
    out
}

pub fn questionnaire_posting_stats(data: &[QuestionnaireRow]) -> PostingStats {
    let mut posting_distribution = Distribution::new();
    for row in data {
        if let Some(posting) = first_existing(&POSTING_COLUMNS, row) {
            bump(&mut posting_distribution, posting);
        }
    }
    PostingStats {
        posting_distribution,
        sample_count: data.len() as u64,
        details_sample: data.iter().take(POSTING_SAMPLE_CAP).map(non_empty_cells).collect(),
    }
}

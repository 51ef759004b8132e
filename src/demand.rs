//! Talent-demand extraction from questionnaire rows.
//!
//! Questionnaire headers are free-form, so each semantic field (posting,
//! salary, education, ...) is resolved to a concrete column by
//! [`detect_column`]: exact candidates first, then substring containment,
//! never choosing a column about the respondent personally
//! ([`is_respondent_column`]). Postings are then tallied together with the
//! education, competency and certificate answers given alongside them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::aggregate::first_existing;
use crate::filters::filter_questionnaire_by_region;
use crate::models::{OrderedMap, QuestionnaireRow};

/// Semantic questionnaire fields, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemandField {
    Posting,
    Salary,
    Education,
    Competency,
    Certificate,
    TalentType,
}

impl DemandField {
    pub const ALL: [DemandField; 6] = [
        DemandField::Posting,
        DemandField::Salary,
        DemandField::Education,
        DemandField::Competency,
        DemandField::Certificate,
        DemandField::TalentType,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DemandField::Posting => "posting",
            DemandField::Salary => "salary",
            DemandField::Education => "education",
            DemandField::Competency => "competency",
            DemandField::Certificate => "certificate",
            DemandField::TalentType => "talent_type",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// Candidate column names, most specific first. Recruitment wording is
    /// preferred over the respondent's own situation.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            DemandField::Posting => &[
                "机构当前最紧缺的岗位",
                "最紧缺的岗位",
                "最缺岗位",
                "紧缺岗位",
                "需求岗位",
                "岗位需求",
                "招聘岗位",
            ],
            DemandField::Salary => &["岗位薪酬", "招聘薪酬", "人才薪酬", "薪资水平", "薪酬水平"],
            DemandField::Education => &[
                "托育人才的学历结构中",
                "学历结构中占比最高",
                "招聘学历",
                "岗位学历要求",
                "学历要求",
            ],
            DemandField::Competency => &["毕业生最欠缺的能力", "岗位能力要求", "能力要求", "技能要求"],
            DemandField::Certificate => &[
                "证书/资质要求",
                "对托育人才的证书",
                "资质要求",
                "所需证书",
                "职业资格",
            ],
            DemandField::TalentType => &["优先考虑的因素", "招聘时优先考虑", "人才能力类型", "能力类型"],
        }
    }
}

const RESPONDENT_COLUMN_PATTERNS: [&str; 6] = [
    "您的最高学历",
    "您最高学历",
    "您当前的岗位",
    "您当前岗位",
    "您当前的薪资",
    "您对当前岗位",
];

/// True for columns asking about the respondent rather than the
/// institution's hiring needs.
pub fn is_respondent_column(col: &str) -> bool {
    if RESPONDENT_COLUMN_PATTERNS.iter().any(|p| col.contains(p)) {
        return true;
    }
    col.starts_with("您的")
        && !col.contains("机构")
        && !col.contains("招聘")
        && ["学历", "岗位", "薪资", "满意度"].iter().any(|x| col.contains(x))
}

/// Resolves a field to a column: the first candidate present verbatim,
/// else the first column containing (or contained in) a candidate.
/// Respondent columns are never chosen.
pub fn detect_column(candidates: &[&str], columns: &[String]) -> Option<String> {
    if let Some(exact) = candidates
        .iter()
        .copied()
        .find(|&c| columns.iter().any(|col| col == c) && !is_respondent_column(c))
    {
        return Some(exact.to_string());
    }
    candidates.iter().copied().find_map(|cand| {
        columns
            .iter()
            .filter(|col| !is_respondent_column(col.as_str()))
            .find(|col| col.contains(cand) || cand.contains(col.as_str()))
            .cloned()
    })
}

fn multi_separator() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[;；,，、\n┋]").expect("static regex"))
}

/// Splits a multi-choice answer. Skipped questions (`(跳过)`) and empty
/// parts are dropped.
pub fn split_multi(value: &str) -> Vec<String> {
    multi_separator()
        .split(value.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "(跳过)")
        .map(str::to_string)
        .collect()
}

const MEANINGLESS_POSTING_KEYWORDS: [&str; 4] = [
    "其他（请注明）",
    "会上课会营销会管理会沟通",
    "综合人才",
    // residue of a split on the questionnaire's 〖...〗 annotations
    "〗",
];

/// Placeholder or vague postings excluded from the demand table.
pub fn is_meaningless_posting(posting: &str) -> bool {
    let s = posting.trim();
    s.is_empty() || s == "无" || MEANINGLESS_POSTING_KEYWORDS.iter().any(|k| s.contains(k))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostingRequirement {
    pub count: u64,
    pub education: OrderedMap<u64>,
    pub competency: OrderedMap<u64>,
    pub certificate: OrderedMap<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalentDemand {
    pub sample_count: u64,
    pub region: Option<String>,
    /// Postings by mention count, descending.
    pub posting_requirements: OrderedMap<PostingRequirement>,
    /// Column resolved for each field, `null` when none was found.
    pub columns_used: OrderedMap<Option<String>>,
    pub raw_sample: Vec<QuestionnaireRow>,
}

impl TalentDemand {
    fn empty(region: Option<&str>) -> Self {
        Self {
            sample_count: 0,
            region: region.map(str::to_string),
            posting_requirements: OrderedMap::new(),
            columns_used: OrderedMap::new(),
            raw_sample: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DemandOptions {
    pub region: Option<String>,
    /// Field name (`posting`, `education`, ...) → column, bypassing detection.
    pub columns_override: HashMap<String, String>,
    pub raw_sample_limit: usize,
    pub filter_meaningless_postings: bool,
}

impl Default for DemandOptions {
    fn default() -> Self {
        Self {
            region: None,
            columns_override: HashMap::new(),
            raw_sample_limit: 10,
            filter_meaningless_postings: true,
        }
    }
}

const SAMPLE_BASE_COLUMNS: [&str; 3] = ["机构名称", "机构所在城市", "您的机构所在城市"];
const SAMPLE_KEYWORDS: [&str; 8] = ["机构", "招聘", "紧缺", "人才", "岗位", "证书", "学历", "能力"];
const SAMPLE_EXCLUDED: [&str; 6] = [
    "您的最高",
    "您最高学历",
    "您当前的岗位",
    "您当前岗位",
    "您当前的薪资",
    "您对当前",
];

/// Sample rows restricted to recruitment-related columns.
fn recruitment_sample(
    rows: &[QuestionnaireRow],
    columns_used: &OrderedMap<Option<String>>,
    all_columns: &[String],
) -> Vec<QuestionnaireRow> {
    let mut include: Vec<&str> = SAMPLE_BASE_COLUMNS.to_vec();
    include.extend(columns_used.iter().filter_map(|(_, c)| c.as_deref()));
    include.extend(all_columns.iter().map(String::as_str).filter(|col| {
        SAMPLE_KEYWORDS.iter().any(|k| col.contains(k))
            && !SAMPLE_EXCLUDED.iter().any(|ex| col.contains(ex))
    }));

    rows.iter()
        .map(|row| {
            let mut out = row.clone();
            out.retain(|k, v| include.contains(&k) && !v.trim().is_empty());
            out
        })
        .collect()
}

fn bump(dist: &mut OrderedMap<u64>, key: &str) {
    match dist.get_mut(key) {
        Some(n) => *n += 1,
        None => dist.insert(key, 1),
    }
}

fn sort_desc(dist: &mut OrderedMap<u64>) {
    dist.sort_by_value(|a, b| b.cmp(a));
}

/// Tallies postings and the requirements reported with them.
pub fn extract_talent_demand(data: &[QuestionnaireRow], options: &DemandOptions) -> TalentDemand {
    let region = options.region.as_deref().filter(|r| !r.is_empty());
    if data.is_empty() {
        return TalentDemand::empty(region);
    }
    let data = filter_questionnaire_by_region(data, region, None);
    if data.is_empty() {
        return TalentDemand::empty(region);
    }

    let all_columns: Vec<String> = data[0].keys().map(str::to_string).collect();
    let columns_used: OrderedMap<Option<String>> = DemandField::ALL
        .into_iter()
        .map(|field| {
            let column = match options.columns_override.get(field.as_str()) {
                Some(col) => Some(col.clone()),
                None => detect_column(field.candidates(), &all_columns),
            };
            (field.as_str().to_string(), column)
        })
        .collect();

    let column = |field: DemandField| columns_used.get(field.as_str()).and_then(|c| c.as_deref());
    let values = |row: &QuestionnaireRow, field: DemandField| -> Vec<String> {
        column(field)
            .and_then(|col| first_existing(&[col], row))
            .map(split_multi)
            .unwrap_or_default()
    };

    let mut requirements: OrderedMap<PostingRequirement> = OrderedMap::new();
    for row in &data {
        let postings = values(row, DemandField::Posting);
        if postings.is_empty() {
            continue;
        }
        let educations = values(row, DemandField::Education);
        let competencies = values(row, DemandField::Competency);
        let certificates = values(row, DemandField::Certificate);

        for posting in &postings {
            if options.filter_meaningless_postings && is_meaningless_posting(posting) {
                continue;
            }
            if !requirements.contains_key(posting) {
                requirements.insert(posting.clone(), PostingRequirement::default());
            }
            let Some(req) = requirements.get_mut(posting) else {
                continue;
            };
            req.count += 1;
            for e in &educations {
                bump(&mut req.education, e);
            }
            for c in &competencies {
                bump(&mut req.competency, c);
            }
            for z in &certificates {
                bump(&mut req.certificate, z);
            }
        }
    }

    requirements.sort_by_value(|a, b| b.count.cmp(&a.count));
    let posting_requirements: OrderedMap<PostingRequirement> = requirements
        .iter()
        .map(|(posting, req)| {
            let mut req = req.clone();
            sort_desc(&mut req.education);
            sort_desc(&mut req.competency);
            sort_desc(&mut req.certificate);
            (posting.to_string(), req)
        })
        .collect();

    let sample_rows = &data[..data.len().min(options.raw_sample_limit)];
    TalentDemand {
        sample_count: data.len() as u64,
        region: region.map(str::to_string),
        posting_requirements,
        raw_sample: recruitment_sample(sample_rows, &columns_used, &all_columns),
        columns_used,
    }
}

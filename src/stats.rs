//! Stats computation: load every source, filter to region and national
//! scope, aggregate both, and assemble the details block.

use anyhow::Result;

use crate::aggregate::{
    cross_validate_institutions, institution_distributions, questionnaire_posting_stats,
    school_distribution, CrossValidation, PostingStats,
};
use crate::config::MajorsConfig;
use crate::filters::{
    filter_institutions, filter_questionnaire_by_region, filter_schools,
    unique_schools, unique_schools_by_institution, SchoolFilter,
};
use crate::fingerprint::DataSources;
use crate::loader::{load_institutions, load_questionnaire, load_schools};
use crate::models::{
    CrossValidationCounts, InstitutionRecord, RegionStats, SchoolRecord, Scope, ScopedStats,
    StatsDetails, StatsQuery, StatsResult, INFERRED_NOTE,
};

fn region_stats(
    institutions: &[InstitutionRecord],
    schools: &[SchoolRecord],
    posting: &PostingStats,
    cross: &CrossValidation,
) -> RegionStats {
    let dists = institution_distributions(institutions);
    RegionStats {
        institution_count: institutions.len() as u64,
        city_distribution: dists.city,
        host_type_distribution: dists.host_type,
        puhui_distribution: dists.puhui,
        service_mode_distribution: dists.service_mode,
        inferred_note: INFERRED_NOTE.to_string(),
        school_count: schools.len() as u64,
        training_point_count: unique_schools(schools).len() as u64,
        institution_year_count: unique_schools_by_institution(schools).len() as u64,
        school_distribution: school_distribution(schools),
        posting_sample_count: posting.sample_count,
        matched_institution_count: cross.matched_count,
    }
}

/// Computes region and national stats for `query`.
///
/// `query.school` takes part in the cache key only; it does not filter.
/// Only a malformed institution registry makes this fail.
pub fn compute_stats(
    sources: &DataSources,
    majors: &MajorsConfig,
    query: &StatsQuery,
    details_limit: usize,
) -> Result<StatsResult> {
    let region = query.region.as_deref().filter(|r| !r.is_empty());

    let inst_all = load_institutions(&sources.institution_json)?;
    let questionnaire = load_questionnaire(&sources.questionnaire_xlsx);

    let inst_region = filter_institutions(&inst_all, region, Scope::Region);
    let inst_national = inst_all;

    let school_filter = |scope: Scope| SchoolFilter {
        region,
        major: query.major.as_deref(),
        year_from: query.started_time,
        education_level: query.education_level.as_deref(),
        scope,
        majors,
    };
    let pattern = sources.school_file_pattern.as_str();
    let (schools_region, schools_national) = match region {
        // Region scope reads only that region's files; national needs all.
        Some(r) => (
            filter_schools(
                &load_schools(&sources.school_dir, pattern, Some(r)),
                &school_filter(Scope::Region),
            ),
            filter_schools(
                &load_schools(&sources.school_dir, pattern, None),
                &school_filter(Scope::National),
            ),
        ),
        None => {
            let all = load_schools(&sources.school_dir, pattern, None);
            (
                filter_schools(&all, &school_filter(Scope::Region)),
                filter_schools(&all, &school_filter(Scope::National)),
            )
        }
    };

    let q_region = filter_questionnaire_by_region(&questionnaire, region, None);
    let q_national = questionnaire;
    let posting_region = questionnaire_posting_stats(&q_region);
    let posting_national = questionnaire_posting_stats(&q_national);

    let cross_region = cross_validate_institutions(&inst_region, &q_region, None);
    let cross_national = cross_validate_institutions(&inst_national, &q_national, None);

    tracing::info!(
        region = region.unwrap_or(""),
        institutions = inst_region.len(),
        schools = schools_region.len(),
        questionnaire_rows = q_region.len(),
        "computed stats"
    );

    let stats = ScopedStats {
        region: region_stats(&inst_region, &schools_region, &posting_region, &cross_region),
        national: region_stats(
            &inst_national,
            &schools_national,
            &posting_national,
            &cross_national,
        ),
    };

    let details = StatsDetails {
        institutions: inst_region.iter().take(details_limit).cloned().collect(),
        schools: schools_region
            .iter()
            .take(details_limit)
            .map(SchoolRecord::detail)
            .collect(),
        questionnaire_posting: Some(posting_region.posting_distribution),
        questionnaire_details_sample: Some(posting_region.details_sample),
        cross_validation: CrossValidationCounts {
            region_matched_count: cross_region.matched_count,
            national_matched_count: cross_national.matched_count,
        },
    };

    Ok(StatsResult { stats, details })
}

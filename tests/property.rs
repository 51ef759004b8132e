use proptest::prelude::*;

use tuoyu_stats::config::MajorsConfig;
use tuoyu_stats::filters::{
    filter_questionnaire_by_region, filter_schools, unique_schools, SchoolFilter,
};
use tuoyu_stats::models::{
    QuestionnaireRow, SchoolRecord, Scope, FIELD_INSTITUTION, FIELD_MAJOR, FIELD_PROGRAM_YEARS,
    FIELD_PROVINCE, FIELD_YEAR,
};
use tuoyu_stats::zoning::parse_zoning;

fn school_strategy() -> impl Strategy<Value = SchoolRecord> {
    (
        prop::sample::select(vec!["甲职业学院", "乙大学", "丙学院"]),
        prop::sample::select(vec!["广东省", "安徽省", ""]),
        prop::sample::select(vec![
            "婴幼儿托育服务与管理(520802)",
            "早期教育(570101K)",
            "计算机应用技术(510201)",
        ]),
        prop::sample::select(vec!["2", "3", "4", "5", ""]),
        prop::sample::select(vec!["2019", "2022", "2023", "未知", ""]),
    )
        .prop_map(|(name, province, major, years, year)| {
            let mut record = SchoolRecord::default();
            for (key, value) in [
                (FIELD_INSTITUTION, name),
                (FIELD_PROVINCE, province),
                (FIELD_MAJOR, major),
                (FIELD_PROGRAM_YEARS, years),
                (FIELD_YEAR, year),
            ] {
                if !value.is_empty() {
                    record.fields.insert(key.to_string(), value.to_string());
                }
            }
            record
        })
}

fn is_subsequence(sub: &[SchoolRecord], of: &[SchoolRecord]) -> bool {
    let mut it = of.iter();
    sub.iter().all(|s| it.any(|o| o == s))
}

proptest! {
    #[test]
    fn unique_schools_is_idempotent(data in prop::collection::vec(school_strategy(), 0..40)) {
        let once = unique_schools(&data);
        let twice = unique_schools(&once);
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.len() <= data.len());
        prop_assert!(is_subsequence(&once, &data));
    }

    #[test]
    fn region_scope_is_subset_of_national(
        data in prop::collection::vec(school_strategy(), 0..40),
        region in prop::sample::select(vec!["广东省", "安徽省", "某不存在区域"]),
        year_from in prop::option::of(2018i64..2025),
        level in prop::option::of(prop::sample::select(vec!["本科", "高职专科"])),
    ) {
        let majors = MajorsConfig::default();
        let filter = |scope| SchoolFilter {
            region: Some(region),
            major: None,
            year_from,
            education_level: level,
            scope,
            majors: &majors,
        };
        let regional = filter_schools(&data, &filter(Scope::Region));
        let national = filter_schools(&data, &filter(Scope::National));
        prop_assert!(regional.len() <= national.len());
        prop_assert!(is_subsequence(&regional, &national));
        prop_assert!(regional.iter().all(|s| s.province() == region));
    }

    #[test]
    fn unknown_region_keeps_every_row(cities in prop::collection::vec("[a-z]{0,6}", 0..10)) {
        let rows: Vec<QuestionnaireRow> = cities
            .iter()
            .map(|c| std::iter::once(("城市".to_string(), c.clone())).collect())
            .collect();
        let filtered = filter_questionnaire_by_region(&rows, Some("某不存在区域"), None);
        prop_assert_eq!(filtered, rows);
    }

    #[test]
    fn parse_zoning_never_panics(s in "\\PC{0,30}") {
        let (province, city) = parse_zoning(&s);
        prop_assert!(province.len() <= s.len());
        prop_assert!(city.len() <= s.len());
    }
}

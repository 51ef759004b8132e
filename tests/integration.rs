use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use tuoyu_stats::api::{StatsApi, StatsOptions};
use tuoyu_stats::cache::InMemoryCacheStore;
use tuoyu_stats::config::{load_config, Config};
use tuoyu_stats::demand::DemandOptions;
use tuoyu_stats::models::StatsQuery;

fn tuoyu_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tuoyu");
    path
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Minimal workbook: one sheet, header row plus data rows as shared strings.
fn questionnaire_xlsx(rows: &[Vec<&str>]) -> Vec<u8> {
    let mut shared: Vec<String> = Vec::new();
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col = (b'A' + c as u8) as char;
            sheet.push_str(&format!(
                r#"<c r="{}{}" t="s"><v>{}</v></c>"#,
                col,
                r + 1,
                shared.len()
            ));
            shared.push(value.to_string());
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut sst = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );
    for s in &shared {
        sst.push_str(&format!("<si><t>{}</t></si>", xml_escape(s)));
    }
    sst.push_str("</sst>");

    let workbook = r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    let rels = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in [
            ("xl/workbook.xml", workbook.to_string()),
            ("xl/_rels/workbook.xml.rels", rels.to_string()),
            ("xl/sharedStrings.xml", sst),
            ("xl/worksheets/sheet1.xml", sheet),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

const INSTITUTIONS: &str = r#"[
  {"institution_name": "广州市阳光普惠托育有限公司", "zoning_name": "广东省广州市天河区", "institution_type": "营利性", "address": "天河路1号"},
  {"institution_name": "深圳市小时托乐园", "zoning_name": "广东省深圳市南山区", "institution_type": "其他"},
  {"institution_name": "合肥市蓓蕾托育中心", "zoning_name": "安徽省合肥市蜀山区", "institution_type": "事业单位"},
  "not an object"
]"#;

const GUANGDONG_SCHOOLS: &str = "机构名称：广东某职业学院
省份：广东省
开设专业：婴幼儿托育服务与管理(520802)
修业年限：3
年份：2023
备注：2023年新增备案
^_^
机构名称：广东某职业学院
省份：广东省
开设专业：婴幼儿托育服务与管理(520802)
修业年限：2
年份：2023
^_^
机构名称：广东某大学
省份：广东省
开设专业：早期教育(570101K)
修业年限：4
年份：2019
^_^
机构名称：广东某技师学院
省份：广东省
开设专业：计算机应用技术(510201)
修业年限：3
年份：2023
^_^
省份：广东省
修业年限：3
^_^
";

const ANHUI_SCHOOLS: &str = "机构名称：安徽某职业学院
省份：安徽省
开设专业：婴幼儿托育服务与管理(520802)
修业年限：3
年份：2022
^_^
";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let data_dir = root.join("db");
    let school_dir = data_dir.join("schools");
    fs::create_dir_all(&school_dir).unwrap();
    fs::write(data_dir.join("institutions.json"), INSTITUTIONS).unwrap();
    fs::write(school_dir.join("moe_majors_广东省_2023.txt"), GUANGDONG_SCHOOLS).unwrap();
    fs::write(school_dir.join("moe_majors_安徽省_2022.txt"), ANHUI_SCHOOLS).unwrap();
    fs::write(school_dir.join("notes.txt"), "开设专业：早期教育").unwrap();

    let xlsx = questionnaire_xlsx(&[
        vec!["机构名称", "省份", "最缺岗位", "学历要求", "您的最高学历"],
        vec!["广州市阳光普惠托育有限公司", "广东省", "保育师┋育婴师", "大专", "本科"],
        vec!["未登记的托育园", "广东", "育婴师", "本科", ""],
        vec!["合肥市蓓蕾托育中心", "安徽省", "园长", "本科", "硕士"],
    ]);
    fs::write(data_dir.join("survey.xlsx"), xlsx).unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = r#"[data]
root = "../db"
institution_json = "institutions.json"
questionnaire_xlsx = "survey.xlsx"
school_dir = "schools"

[cache]
dir = "cache"
"#;
    let config_path = config_dir.join("tuoyu.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tuoyu(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tuoyu_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tuoyu binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn guangdong() -> StatsQuery {
    StatsQuery {
        region: Some("广东省".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_stats_region_and_national() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let api = StatsApi::with_store(config, Box::new(InMemoryCacheStore::new()));

    let response = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
    let region = &response.result.stats.region;
    let national = &response.result.stats.national;

    assert_eq!(region.institution_count, 2);
    assert_eq!(national.institution_count, 3);
    assert_eq!(region.city_distribution["广东省"]["广州市"], 1);
    assert_eq!(region.city_distribution["广东省"]["深圳市"], 1);
    assert_eq!(region.host_type_distribution["民办"], 1);
    assert_eq!(region.host_type_distribution["未知"], 1);
    assert_eq!(national.host_type_distribution["公办"], 1);
    assert_eq!(region.puhui_distribution["普惠"], 1);

    // Three related majors in Guangdong; the computer major and the
    // major-less block are out.
    assert_eq!(region.school_count, 3);
    assert_eq!(region.training_point_count, 2);
    assert_eq!(region.institution_year_count, 2);
    assert_eq!(national.school_count, 4);

    assert_eq!(region.posting_sample_count, 2);
    assert_eq!(national.posting_sample_count, 3);
    assert_eq!(region.matched_institution_count, 1);
    assert_eq!(national.matched_institution_count, 2);

    let details = &response.result.details;
    assert_eq!(details.institutions.len(), 2);
    assert_eq!(details.schools.len(), 3);
    assert_eq!(details.cross_validation.region_matched_count, 1);
    let posting = details.questionnaire_posting.as_ref().unwrap();
    assert_eq!(posting["育婴师"], 1);
    assert_eq!(posting["保育师┋育婴师"], 1);
}

#[test]
fn test_education_level_and_year_filters() {
    let (_tmp, config_path) = setup_test_env();
    let api = StatsApi::with_store(
        load_config(&config_path).unwrap(),
        Box::new(InMemoryCacheStore::new()),
    );
    let options = StatsOptions {
        use_cache: false,
        ..Default::default()
    };

    let vocational = StatsQuery {
        education_level: Some("高职专科".to_string()),
        ..guangdong()
    };
    let response = api.get_stats(&vocational, &options).unwrap();
    assert_eq!(response.result.stats.region.school_count, 2);

    let bachelor = StatsQuery {
        education_level: Some("本科".to_string()),
        ..guangdong()
    };
    let response = api.get_stats(&bachelor, &options).unwrap();
    assert_eq!(response.result.stats.region.school_count, 1);

    let recent = StatsQuery {
        started_time: Some(2020),
        ..guangdong()
    };
    let response = api.get_stats(&recent, &options).unwrap();
    assert_eq!(response.result.stats.region.school_count, 2);
    assert_eq!(response.result.stats.national.school_count, 3);

    let by_code = StatsQuery {
        major: Some("570101K".to_string()),
        ..guangdong()
    };
    let response = api.get_stats(&by_code, &options).unwrap();
    assert_eq!(response.result.stats.region.school_count, 1);
}

#[test]
fn test_cache_reused_until_source_changes() {
    let (tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let cache_file = config.cache_path();
    let api = StatsApi::from_config(config);

    let first = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
    assert!(!first.meta.from_cache);
    assert!(cache_file.exists());

    let second = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
    assert!(second.meta.from_cache);
    assert_eq!(first.result, second.result);

    let school_file = tmp.path().join("db/schools/moe_majors_广东省_2023.txt");
    let mut content = fs::read_to_string(&school_file).unwrap();
    content.push('\n');
    fs::write(&school_file, content).unwrap();

    let third = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
    assert!(!third.meta.from_cache);
    assert_ne!(third.meta.fingerprints, first.meta.fingerprints);
}

#[test]
fn test_missing_sources_yield_empty_stats() {
    let tmp = TempDir::new().unwrap();
    let api = StatsApi::with_store(
        Config::with_root(tmp.path()),
        Box::new(InMemoryCacheStore::new()),
    );
    let response = api.get_stats(&guangdong(), &StatsOptions::default()).unwrap();
    assert_eq!(response.result.stats.region.institution_count, 0);
    assert_eq!(response.result.stats.national.school_count, 0);
    assert_eq!(response.result.stats.region.posting_sample_count, 0);
    assert!(response.result.stats.region.city_distribution.is_empty());
    assert_eq!(response.meta.fingerprints.institution, "");
}

#[test]
fn test_talent_demand_from_workbook() {
    let (_tmp, config_path) = setup_test_env();
    let api = StatsApi::from_config(load_config(&config_path).unwrap());

    let options = DemandOptions {
        region: Some("广东省".to_string()),
        ..Default::default()
    };
    let demand = api.get_talent_demand(&options);
    assert_eq!(demand.sample_count, 2);
    assert_eq!(
        demand.posting_requirements.keys().collect::<Vec<_>>(),
        vec!["育婴师", "保育师"]
    );
    let nanny = demand.posting_requirements.get("育婴师").unwrap();
    assert_eq!(nanny.count, 2);
    assert_eq!(nanny.education.get("大专"), Some(&1));
    assert_eq!(nanny.education.get("本科"), Some(&1));
    assert_eq!(
        demand.columns_used.get("education"),
        Some(&Some("学历要求".to_string()))
    );
    assert!(demand
        .raw_sample
        .iter()
        .all(|row| !row.contains_key("您的最高学历")));

    // An unknown region falls back to every row.
    let options = DemandOptions {
        region: Some("某不存在区域".to_string()),
        ..Default::default()
    };
    assert_eq!(api.get_talent_demand(&options).sample_count, 3);
}

#[test]
fn test_cli_stats_outputs_json() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tuoyu(&config_path, &["stats", "--region", "广东省"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["stats"]["region"]["institution_count"], 2);
    assert_eq!(json["stats"]["national"]["institution_count"], 3);
    assert_eq!(json["meta"]["from_cache"], false);
    assert!(json["stats"]["region"]["_inferred_note"].is_string());

    let (stdout, _, success) = run_tuoyu(&config_path, &["stats", "--region", "广东省"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["meta"]["from_cache"], true);
}

#[test]
fn test_cli_no_questionnaire_details() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tuoyu(
        &config_path,
        &["stats", "--no-cache", "--no-questionnaire-details"],
    );
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(json["details"].get("questionnaire_posting").is_none());
    assert!(json["details"].get("cross_validation").is_some());
}

#[test]
fn test_cli_demand_and_columns() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tuoyu(
        &config_path,
        &["demand", "--region", "安徽省", "--details-limit", "1"],
    );
    assert!(success, "demand failed: stdout={}, stderr={}", stdout, stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["sample_count"], 1);
    assert_eq!(json["posting_requirements"]["园长"]["count"], 1);
    assert_eq!(json["raw_sample"].as_array().unwrap().len(), 1);

    let (stdout, _, success) = run_tuoyu(&config_path, &["columns"]);
    assert!(success);
    let columns: Vec<String> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(columns[0], "机构名称");
    assert_eq!(columns.len(), 5);
}

#[test]
fn test_cli_rejects_unknown_demand_field() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_tuoyu(&config_path, &["demand", "--column", "salary_band=Q1"]);
    assert!(!success);
    assert!(stderr.contains("salary_band"));
}

#[test]
fn test_cli_cache_info_and_clear() {
    let (_tmp, config_path) = setup_test_env();

    run_tuoyu(&config_path, &["stats", "--region", "广东省"]);
    run_tuoyu(&config_path, &["stats", "--region", "安徽省"]);

    let (stdout, _, success) = run_tuoyu(&config_path, &["cache", "info"]);
    assert!(success);
    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["entries"], 2);

    let (stdout, stderr, success) = run_tuoyu(&config_path, &["cache", "clear"]);
    assert!(success, "clear failed: stderr={}", stderr);
    assert!(stdout.contains("Cache cleared"));

    let (stdout, _, _) = run_tuoyu(&config_path, &["cache", "info"]);
    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["entries"], 0);
}

#[test]
fn test_cli_fingerprints() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_tuoyu(&config_path, &["fingerprints"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    for key in ["institution", "questionnaire", "school"] {
        assert_eq!(json[key].as_str().unwrap().len(), 64, "{}", key);
    }
}

#[test]
fn test_cli_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[data]\nschool_file_pattern = \"moe_majors.txt\"\n").unwrap();
    let (_, stderr, success) = run_tuoyu(&bad, &["fingerprints"]);
    assert!(!success);
    assert!(stderr.contains("school_file_pattern"));
}

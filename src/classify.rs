//! Derived institution attributes inferred from registry fields.
//!
//! Puhui status and service modes are keyword heuristics over the
//! institution's names and are reported as such in the stats output.

use crate::models::InstitutionRecord;

pub const HOST_PUBLIC: &str = "公办";
pub const HOST_PRIVATE: &str = "民办";
pub const HOST_UNKNOWN: &str = "未知";

pub const PUHUI: &str = "普惠";
pub const NON_PUHUI: &str = "非普惠";

pub const MODE_FULL_DAY: &str = "全日托";
pub const MODE_HALF: &str = "半月托";
pub const MODE_HOURLY: &str = "小时托";

/// Host type from `institution_type`: public units are 公办, for-profit and
/// non-profit registrations are 民办.
pub fn infer_host_type(record: &InstitutionRecord) -> &'static str {
    match record.institution_type.as_deref().unwrap_or("").trim() {
        "事业单位" => HOST_PUBLIC,
        "营利性" | "非营利性" => HOST_PRIVATE,
        _ => HOST_UNKNOWN,
    }
}

pub fn infer_is_puhui(record: &InstitutionRecord) -> &'static str {
    if name_text(record).contains(PUHUI) {
        PUHUI
    } else {
        NON_PUHUI
    }
}

/// Service modes mentioned in the names, in fixed order. May be empty.
pub fn infer_service_modes(record: &InstitutionRecord) -> Vec<&'static str> {
    const RULES: [(&str, [&str; 2]); 3] = [
        (MODE_FULL_DAY, ["全日托", "全日制"]),
        (MODE_HALF, ["半月托", "半日托"]),
        (MODE_HOURLY, ["小时托", "计时托"]),
    ];
    let text = name_text(record);
    RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(mode, _)| *mode)
        .collect()
}

fn name_text(record: &InstitutionRecord) -> String {
    [record.name(), record.other_name()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

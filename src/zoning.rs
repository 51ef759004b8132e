//! Rule-based decomposition of undelimited administrative address strings
//! ("zoning names") into a province and a city-or-district.

const PROVINCE_MARKERS: [&str; 3] = ["自治区", "省", "市"];
const CITY_MARKERS: [&str; 4] = ["自治州", "地区", "盟", "市"];
const MUNICIPALITIES: [&str; 4] = ["北京市", "天津市", "上海市", "重庆市"];
const MUNICIPAL_DISTRICT_PREFIXES: [&str; 2] = ["市辖区", "辖区"];

/// Splits a zoning string into `(province, city)`.
///
/// Never fails: empty input gives `("", "")`, and input with no province
/// marker is returned whole as the province. Under the four municipalities
/// the second component is the district (`北京市市辖区西城区` →
/// `(北京市, 西城区)`).
///
/// ```
/// use tuoyu_stats::zoning::parse_zoning;
///
/// assert_eq!(
///     parse_zoning("云南省大理白族自治州大理市"),
///     ("云南省".to_string(), "大理白族自治州".to_string())
/// );
/// ```
pub fn parse_zoning(zoning: &str) -> (String, String) {
    let s = zoning.trim();
    if s.is_empty() {
        return (String::new(), String::new());
    }

    let Some((province, rest)) = split_through_first(s, &PROVINCE_MARKERS) else {
        return (s.to_string(), String::new());
    };
    let rest = rest.trim_start();
    if rest.is_empty() {
        return (province.to_string(), String::new());
    }

    if MUNICIPALITIES.contains(&province) {
        return (province.to_string(), municipal_district(rest));
    }

    if let Some((city, _)) = split_through_first(rest, &CITY_MARKERS) {
        return (province.to_string(), city.to_string());
    }
    let city = if let Some(idx) = rest.find('区') {
        format!("{}区", &rest[..idx])
    } else if let Some(idx) = rest.find('县') {
        format!("{}县", &rest[..idx])
    } else {
        rest.to_string()
    };
    (province.to_string(), city)
}

/// Tries `markers` in order; for the first one present, splits `s` right
/// after its first occurrence.
fn split_through_first<'a>(s: &'a str, markers: &[&str]) -> Option<(&'a str, &'a str)> {
    markers.iter().find_map(|marker| {
        s.find(marker).map(|idx| {
            let end = idx + marker.len();
            (&s[..end], &s[end..])
        })
    })
}

fn municipal_district(rest: &str) -> String {
    let mut rest = rest;
    for prefix in MUNICIPAL_DISTRICT_PREFIXES {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped.trim_start();
            break;
        }
    }
    for suffix in ['区', '县'] {
        if let Some(idx) = rest.find(suffix) {
            if idx > 0 {
                return format!("{}{}", &rest[..idx], suffix);
            }
        }
    }
    rest.to_string()
}

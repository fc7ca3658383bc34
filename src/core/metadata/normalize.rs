//! Coercions shared by every metadata source.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

const DATETIME_FORMATS: &[&str] = &["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y:%m:%d", "%Y-%m-%d"];

/// ISO-8601 without zone, seconds precision
pub(crate) const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse an EXIF-style date into ISO-8601 local time.
///
/// Accepts `YYYY:MM:DD HH:MM:SS`, `YYYY-MM-DD HH:MM:SS` and the two
/// date-only forms. Anything else, including the all-zero placeholder some
/// cameras write, is `None`.
pub fn parse_datetime(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('\0');

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.format(ISO_FORMAT).to_string());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.format(ISO_FORMAT).to_string());
        }
    }
    None
}

/// Parse a float, accepting `num/den` fractions
pub fn parse_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let value = match trimmed.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => trimmed.parse().ok()?,
    };
    value.is_finite().then_some(value)
}

/// Parse an integer, truncating floats and fractions toward zero
pub fn parse_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    parse_float(trimmed).map(|f| f.trunc() as i64)
}

/// Float from a JSON number or string
pub fn float_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float(s),
        _ => None,
    }
}

/// Integer from a JSON number or string
pub fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => parse_int(s),
        _ => None,
    }
}

/// Non-empty text from a JSON string or number
pub fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Trimmed text, `None` when blank
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end_matches('\0').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_exif_datetime() {
        assert_eq!(
            parse_datetime("2023:07:14 09:30:05").as_deref(),
            Some("2023-07-14T09:30:05")
        );
    }

    #[test]
    fn parses_dashed_datetime_and_date_only() {
        assert_eq!(
            parse_datetime("2023-07-14 09:30:05").as_deref(),
            Some("2023-07-14T09:30:05")
        );
        assert_eq!(parse_datetime("2023:07:14").as_deref(), Some("2023-07-14T00:00:00"));
        assert_eq!(parse_datetime(" 2023-07-14 ").as_deref(), Some("2023-07-14T00:00:00"));
    }

    #[test]
    fn unparsable_dates_are_absent() {
        assert_eq!(parse_datetime("0000:00:00 00:00:00"), None);
        assert_eq!(parse_datetime("last tuesday"), None);
        assert_eq!(parse_datetime(""), None);
    }

    #[test]
    fn fractions_divide() {
        assert_eq!(parse_float("28/10"), Some(2.8));
        assert_eq!(parse_float("1/250"), Some(0.004));
        assert_eq!(parse_int("100/1"), Some(100));
        assert_eq!(parse_int("3.9"), Some(3));
    }

    #[test]
    fn bad_numbers_are_absent() {
        assert_eq!(parse_float("1/0"), None);
        assert_eq!(parse_float("f/2.8"), None);
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int("1/2/3"), None);
    }

    #[test]
    fn json_values_coerce() {
        assert_eq!(float_value(&json!(2.8)), Some(2.8));
        assert_eq!(float_value(&json!("56/10")), Some(5.6));
        assert_eq!(int_value(&json!(400)), Some(400));
        assert_eq!(int_value(&json!(400.7)), Some(400));
        assert_eq!(int_value(&json!(null)), None);
        assert_eq!(text_value(&json!("  ")), None);
        assert_eq!(text_value(&json!("Canon")).as_deref(), Some("Canon"));
    }
}

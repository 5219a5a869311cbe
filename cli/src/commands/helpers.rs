use anyhow::{Context, Result};
use chrono::NaiveDate;

/// Resolve `--date` against `today`: an ISO date, `today`, or `yesterday`.
pub(crate) fn parse_date(arg: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match arg.map(str::trim) {
        None | Some("today") => Ok(today),
        Some("yesterday") => today.pred_opt().context("Date out of range"),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD, today, or yesterday")),
    }
}

/// One-line `{"error": ...}` for `--json` output.
pub(crate) fn json_error(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Calories without decimals, never printed as "-0".
pub(crate) fn kcal(v: f64) -> String {
    let rounded = v.round();
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{rounded:.0}")
    }
}

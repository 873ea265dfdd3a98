//! Deterministic alert identity
//!
//! The id is a pure function of (event name, provider start time, position in
//! the batch), so re-ingesting the same provider payload from any trigger
//! upserts instead of duplicating. The tuple is intentionally coarse: if the
//! provider reuses it, it is re-reporting the same hazard.

use regex::Regex;
use std::sync::OnceLock;

static WHITESPACE: OnceLock<Regex> = OnceLock::new();

/// Derive the stable id for a raw alert.
pub fn alert_id(event: &str, start: i64, batch_index: usize) -> String {
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"));
    let slug = re.replace_all(event.trim(), "-").to_lowercase();
    format!("{}-{}-{}", slug, start, batch_index)
}

//! ZIP/ZCTA identity normalization: the one piece of logic every tool in
//! this repository shares, and the one place a silent mistake corrupts
//! everything downstream (dropped rows, duplicated geometry, lost
//! leading zeros).
//!
//! The canonical form is a fixed-width 5-digit string. Join keys compare
//! as strings, never as numbers, so `03216` can never collide with or
//! drift from `3216`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{info, warn};

use crate::error::PipelineError;

/// Candidate ZCTA identifier columns across Census vintages, in the
/// priority order the map build has always used: 2010 tabulation names
/// first, then 2020, then the unsuffixed fallbacks.
pub const ZCTA_ID_CANDIDATES: &[&str] = &[
    "ZCTA5CE10",
    "ZCTA5CE20",
    "GEOID10",
    "GEOID20",
    "ZCTA5CE",
    "GEOID",
];

/// State-name columns seen in the cartographic boundary files.
pub const STATE_NAME_CANDIDATES: &[&str] = &["NAME", "STATE_NAME"];

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// A 5-character, all-digit, left-zero-padded ZIP code. Only
/// constructible through [`normalize_zip`], so holding one is proof the
/// invariant holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalZip(String);

impl CanonicalZip {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalZip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of normalizing one raw identifier.
///
/// `Truncated` still carries a usable key, but the pre-padding digit run
/// was longer than 5 characters (a ZIP+4 remnant or a composite GEOID),
/// which callers must surface as a warning rather than resolve silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedZip {
    Exact(CanonicalZip),
    Truncated(CanonicalZip),
    Absent,
}

impl NormalizedZip {
    pub fn zip(&self) -> Option<&CanonicalZip> {
        match self {
            NormalizedZip::Exact(z) | NormalizedZip::Truncated(z) => Some(z),
            NormalizedZip::Absent => None,
        }
    }

    pub fn into_zip(self) -> Option<CanonicalZip> {
        match self {
            NormalizedZip::Exact(z) | NormalizedZip::Truncated(z) => Some(z),
            NormalizedZip::Absent => None,
        }
    }
}

/// Canonicalize one raw ZIP/ZCTA value.
///
/// Takes the first maximal run of ASCII digits anywhere in the input
/// (so `"FL33139"` → `33139` and the float rendering `"3216.0"` stops at
/// the dot), left-pads with zeros to 5, and truncates to the first 5.
/// No digits at all degrades to `Absent`. Total: never panics, whatever
/// the input.
pub fn normalize_zip(raw: &str) -> NormalizedZip {
    let run = match DIGIT_RUN.find(raw) {
        Some(m) => m.as_str(),
        None => return NormalizedZip::Absent,
    };
    let truncated = run.len() > 5;
    let canonical = if run.len() >= 5 {
        run[..5].to_string()
    } else {
        format!("{:0>5}", run)
    };
    if truncated {
        NormalizedZip::Truncated(CanonicalZip(canonical))
    } else {
        NormalizedZip::Exact(CanonicalZip(canonical))
    }
}

/// Inclusive year bounds for the panel. A configuration value, not a
/// constant of the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn new(min: i32, max: i32) -> Self {
        YearRange { min, max }
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.min && year <= self.max
    }
}

impl Default for YearRange {
    // The observed eviction panel.
    fn default() -> Self {
        YearRange::new(2004, 2016)
    }
}

/// Coerce a raw year to an in-range integer. Accepts integer text and
/// zero-fraction float renderings (`"2010.0"`); anything non-numeric or
/// outside `range` is `None`, never clamped.
pub fn normalize_year(raw: &str, range: YearRange) -> Option<i32> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let year = match s.parse::<i32>() {
        Ok(y) => y,
        Err(_) => {
            let f: f64 = s.parse().ok()?;
            if !f.is_finite() || f.fract() != 0.0 || f.abs() > i32::MAX as f64 {
                return None;
            }
            f as i32
        }
    };
    range.contains(year).then_some(year)
}

/// Pick the identifier column out of a drifting schema: the first entry
/// of `candidates` present in `columns` wins, so the caller's ordering
/// is the vintage-preference policy. No candidate present is fatal and
/// the error lists every column that IS there.
pub fn resolve_identifier_column(
    columns: &[String],
    candidates: &[&str],
) -> Result<String, PipelineError> {
    for cand in candidates {
        if columns.iter().any(|c| c == cand) {
            return Ok((*cand).to_string());
        }
    }
    Err(PipelineError::missing_columns(candidates, columns))
}

/// Per-run tally of normalization outcomes. Absent keys are missing
/// data, not errors, but they must be visible in the log, not silently
/// dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipStats {
    pub total: u64,
    pub absent: u64,
    pub truncated: u64,
}

impl ZipStats {
    pub fn record(&mut self, outcome: &NormalizedZip) {
        self.total += 1;
        match outcome {
            NormalizedZip::Absent => self.absent += 1,
            NormalizedZip::Truncated(_) => self.truncated += 1,
            NormalizedZip::Exact(_) => {}
        }
    }

    pub fn log_summary(&self, label: &str) {
        if self.absent > 0 {
            warn!(
                "{}: {} of {} identifiers had no digits and were dropped as absent",
                label, self.absent, self.total
            );
        }
        if self.truncated > 0 {
            warn!(
                "{}: {} of {} identifiers had digit runs longer than 5 and were truncated",
                label, self.truncated, self.total
            );
        }
        info!(
            "{}: normalized {} identifiers ({} absent, {} truncated)",
            label, self.total, self.absent, self.truncated
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_pads_short_runs() {
        assert_eq!(normalize_zip("3216").zip().unwrap().as_str(), "03216");
        assert_eq!(normalize_zip("7").zip().unwrap().as_str(), "00007");
    }

    #[test]
    fn zip_stops_at_float_point() {
        // Numeric storage renders "3216.0"; the run ends at the dot.
        assert_eq!(normalize_zip("3216.0").zip().unwrap().as_str(), "03216");
    }

    #[test]
    fn zip_extracts_from_prefixed_text() {
        assert_eq!(normalize_zip("FL33139").zip().unwrap().as_str(), "33139");
        assert_eq!(normalize_zip(" 33139 ").zip().unwrap().as_str(), "33139");
    }

    #[test]
    fn zip_plus_four_is_flagged_not_rejected() {
        let out = normalize_zip("331391234");
        assert_eq!(out, NormalizedZip::Truncated(CanonicalZip("33139".into())));
    }

    #[test]
    fn composite_geoid_is_flagged() {
        // County+tract composites are longer than 5 digits; the policy is
        // first-5 with a visible warning, never a silent pick.
        let out = normalize_zip("12086001402");
        match out {
            NormalizedZip::Truncated(z) => assert_eq!(z.as_str(), "12086"),
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn zip_no_digits_is_absent() {
        assert_eq!(normalize_zip(""), NormalizedZip::Absent);
        assert_eq!(normalize_zip("none"), NormalizedZip::Absent);
        assert_eq!(normalize_zip("  "), NormalizedZip::Absent);
    }

    #[test]
    fn zip_always_five_digits() {
        for raw in ["0", "12", "123", "1234", "12345", "123456", "a9b8c7"] {
            let out = normalize_zip(raw);
            let z = out.zip().expect("digits present");
            assert_eq!(z.as_str().len(), 5);
            assert!(z.as_str().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn year_in_range_passes_through() {
        let range = YearRange::default();
        for y in 2004..=2016 {
            assert_eq!(normalize_year(&y.to_string(), range), Some(y));
        }
    }

    #[test]
    fn year_outside_range_is_absent_not_clamped() {
        let range = YearRange::default();
        assert_eq!(normalize_year("2020", range), None);
        assert_eq!(normalize_year("2003", range), None);
    }

    #[test]
    fn year_accepts_float_rendering() {
        let range = YearRange::default();
        assert_eq!(normalize_year("2010.0", range), Some(2010));
        assert_eq!(normalize_year("2010.5", range), None);
        assert_eq!(normalize_year("n/a", range), None);
        assert_eq!(normalize_year("", range), None);
    }

    #[test]
    fn resolver_honors_candidate_priority() {
        let columns: Vec<String> = vec!["GEOID20".into(), "NAME".into()];
        let got =
            resolve_identifier_column(&columns, &["ZCTA5CE10", "GEOID20", "GEOID"]).unwrap();
        assert_eq!(got, "GEOID20");

        // Both vintages present: earlier candidate wins.
        let both: Vec<String> = vec!["GEOID20".into(), "ZCTA5CE10".into()];
        let got = resolve_identifier_column(&both, &["ZCTA5CE10", "GEOID20", "GEOID"]).unwrap();
        assert_eq!(got, "ZCTA5CE10");
    }

    #[test]
    fn resolver_failure_lists_found_columns() {
        let columns: Vec<String> = vec!["NAME".into()];
        let err = resolve_identifier_column(&columns, &["ZCTA5CE10", "GEOID20", "GEOID"])
            .unwrap_err();
        match err {
            PipelineError::Schema(msg) => assert!(msg.contains("NAME"), "{}", msg),
            other => panic!("expected Schema, got {:?}", other),
        }
    }

    #[test]
    fn stats_count_outcomes() {
        let mut stats = ZipStats::default();
        for raw in ["3216", "", "331391234"] {
            stats.record(&normalize_zip(raw));
        }
        assert_eq!(stats.total, 3);
        assert_eq!(stats.absent, 1);
        assert_eq!(stats.truncated, 1);
    }
}

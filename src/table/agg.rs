//! The ZIP×year group-by. Reducers are configuration, applied only
//! within (CanonicalZip, YearKey) groups, and rate fields are always
//! recomputed from aggregated numerator/denominator afterwards — a mean
//! of per-row rates is a statistically invalid rate-of-rates and must
//! never be produced.

use std::collections::{BTreeMap, BTreeSet};

use crate::ident::CanonicalZip;

/// One cell. `Absent` is an explicit value, not a NaN that can leak
/// into arithmetic undetected.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Text(String),
    Absent,
}

impl Value {
    pub fn num(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// CSV rendering: whole numbers without a trailing `.0`, absent as
    /// the empty field.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Num(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                format!("{}", *v as i64)
            }
            Value::Num(v) => format!("{}", v),
            Value::Text(s) => s.clone(),
            Value::Absent => String::new(),
        }
    }
}

/// A normalized tabular row: canonical key plus measure cells aligned
/// with a caller-held column list.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRow {
    pub zip: CanonicalZip,
    pub year: i32,
    pub values: Vec<Value>,
}

/// Per-measure reduction function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Mean,
    Max,
    First,
    /// Distinct non-empty strings, sorted, joined with `;`.
    ConcatUniqueSorted,
}

enum Acc {
    Sum(f64),
    Mean { sum: f64, n: u64 },
    Max(Option<f64>),
    First(Option<Value>),
    Concat(BTreeSet<String>),
}

impl Acc {
    fn new(reducer: Reducer) -> Self {
        match reducer {
            Reducer::Sum => Acc::Sum(0.0),
            Reducer::Mean => Acc::Mean { sum: 0.0, n: 0 },
            Reducer::Max => Acc::Max(None),
            Reducer::First => Acc::First(None),
            Reducer::ConcatUniqueSorted => Acc::Concat(BTreeSet::new()),
        }
    }

    fn push(&mut self, value: &Value) {
        match self {
            Acc::Sum(total) => {
                if let Some(v) = value.num() {
                    *total += v;
                }
            }
            Acc::Mean { sum, n } => {
                if let Some(v) = value.num() {
                    *sum += v;
                    *n += 1;
                }
            }
            Acc::Max(max) => {
                if let Some(v) = value.num() {
                    *max = Some(max.map_or(v, |m: f64| m.max(v)));
                }
            }
            Acc::First(first) => {
                if first.is_none() && !value.is_absent() {
                    *first = Some(value.clone());
                }
            }
            Acc::Concat(set) => {
                if let Value::Text(s) = value {
                    let s = s.trim();
                    if !s.is_empty() && !s.eq_ignore_ascii_case("nan") {
                        set.insert(s.to_string());
                    }
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Acc::Sum(total) => Value::Num(total),
            Acc::Mean { sum, n } => {
                if n == 0 {
                    Value::Absent
                } else {
                    Value::Num(sum / n as f64)
                }
            }
            Acc::Max(max) => max.map_or(Value::Absent, Value::Num),
            Acc::First(first) => first.unwrap_or(Value::Absent),
            Acc::Concat(set) => {
                Value::Text(set.into_iter().collect::<Vec<_>>().join(";"))
            }
        }
    }
}

/// Collapse rows to one per (zip, year). `reducers` is positional over
/// `KeyedRow::values`; output is ordered by key so runs are
/// byte-reproducible.
pub fn aggregate(rows: Vec<KeyedRow>, reducers: &[Reducer]) -> Vec<KeyedRow> {
    let mut groups: BTreeMap<(CanonicalZip, i32), Vec<Acc>> = BTreeMap::new();
    for row in rows {
        let accs = groups
            .entry((row.zip, row.year))
            .or_insert_with(|| reducers.iter().map(|r| Acc::new(*r)).collect());
        for (acc, value) in accs.iter_mut().zip(row.values.iter()) {
            acc.push(value);
        }
    }
    groups
        .into_iter()
        .map(|((zip, year), accs)| KeyedRow {
            zip,
            year,
            values: accs.into_iter().map(Acc::finish).collect(),
        })
        .collect()
}

/// Percentage rate from aggregated numerator and denominator. A zero or
/// absent denominator yields absent, never infinity or zero.
pub fn rate(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => Some(100.0 * n / d),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::normalize_zip;

    fn zip(raw: &str) -> CanonicalZip {
        normalize_zip(raw).into_zip().unwrap()
    }

    fn row(z: &str, year: i32, values: Vec<Value>) -> KeyedRow {
        KeyedRow {
            zip: zip(z),
            year,
            values,
        }
    }

    #[test]
    fn sums_and_means_within_one_key() {
        // "3216" and "03216" are the same canonical key, so the two rows
        // collapse to filings=15, households=75, filing_rate=20.
        let rows = vec![
            row("3216", 2010, vec![Value::Num(10.0), Value::Num(100.0)]),
            row("03216", 2010, vec![Value::Num(5.0), Value::Num(50.0)]),
        ];
        let out = aggregate(rows, &[Reducer::Sum, Reducer::Mean]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].zip.as_str(), "03216");
        assert_eq!(out[0].year, 2010);
        assert_eq!(out[0].values[0], Value::Num(15.0));
        assert_eq!(out[0].values[1], Value::Num(75.0));
        let r = rate(out[0].values[0].num(), out[0].values[1].num()).unwrap();
        assert!((r - 20.0).abs() < 1e-9);
    }

    #[test]
    fn recomputed_rate_is_not_mean_of_rates() {
        // Row rates are 10% (10/100) and 50% (5/10); their mean is 30%,
        // but the aggregate rate is 100*15/55 ≈ 27.27%. The pipeline must
        // produce the latter.
        let rows = vec![
            row("33139", 2005, vec![Value::Num(10.0), Value::Num(100.0)]),
            row("33139", 2005, vec![Value::Num(5.0), Value::Num(10.0)]),
        ];
        let out = aggregate(rows, &[Reducer::Sum, Reducer::Sum]);
        let aggregated = rate(out[0].values[0].num(), out[0].values[1].num()).unwrap();
        let mean_of_rates = (10.0 + 50.0) / 2.0;
        assert!((aggregated - 100.0 * 15.0 / 110.0).abs() < 1e-9);
        assert!((aggregated - mean_of_rates).abs() > 1.0);
    }

    #[test]
    fn distinct_keys_stay_distinct() {
        let rows = vec![
            row("33139", 2005, vec![Value::Num(1.0)]),
            row("33139", 2006, vec![Value::Num(2.0)]),
            row("33140", 2005, vec![Value::Num(3.0)]),
        ];
        let out = aggregate(rows, &[Reducer::Sum]);
        assert_eq!(out.len(), 3);
        // Ordered by (zip, year).
        assert_eq!(out[0].year, 2005);
        assert_eq!(out[1].year, 2006);
        assert_eq!(out[2].zip.as_str(), "33140");
    }

    #[test]
    fn max_and_concat_for_storm_flags() {
        let rows = vec![
            row(
                "33139",
                2005,
                vec![Value::Num(0.0), Value::Text("WILMA".into())],
            ),
            row(
                "33139",
                2005,
                vec![Value::Num(1.0), Value::Text("KATRINA".into())],
            ),
            row(
                "33139",
                2005,
                vec![Value::Absent, Value::Text("WILMA".into())],
            ),
            row("33139", 2005, vec![Value::Num(0.0), Value::Text("nan".into())]),
        ];
        let out = aggregate(rows, &[Reducer::Max, Reducer::ConcatUniqueSorted]);
        assert_eq!(out[0].values[0], Value::Num(1.0));
        assert_eq!(out[0].values[1], Value::Text("KATRINA;WILMA".into()));
    }

    #[test]
    fn mean_of_nothing_is_absent() {
        let rows = vec![row("33139", 2005, vec![Value::Absent])];
        let out = aggregate(rows, &[Reducer::Mean]);
        assert_eq!(out[0].values[0], Value::Absent);
    }

    #[test]
    fn rate_guards_denominator() {
        assert_eq!(rate(Some(10.0), Some(0.0)), None);
        assert_eq!(rate(Some(10.0), None), None);
        assert_eq!(rate(None, Some(100.0)), None);
        assert_eq!(rate(Some(10.0), Some(40.0)), Some(25.0));
    }

    #[test]
    fn first_takes_first_present() {
        let rows = vec![
            row("33139", 2005, vec![Value::Absent]),
            row("33139", 2005, vec![Value::Num(7.0)]),
            row("33139", 2005, vec![Value::Num(9.0)]),
        ];
        let out = aggregate(rows, &[Reducer::First]);
        assert_eq!(out[0].values[0], Value::Num(7.0));
    }
}

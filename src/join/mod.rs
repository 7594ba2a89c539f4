//! The tabular×polygon join. The direction is an explicit choice per
//! tool because it decides which rows silently disappear; keys compare
//! as canonical 5-digit strings, never as numbers.

use geo::Geometry;
use std::collections::HashMap;
use tracing::debug;

use crate::ident::CanonicalZip;
use crate::table::{KeyedRow, Value};
use crate::vector::PolygonRecord;

/// Which side survives an unmatched key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDirection {
    /// Every tabular row comes out, geometry `None` when unmatched.
    /// Output row count == input tabular row count, always.
    KeepAllTabular,
    /// Every polygon comes out once per matching tabular row, or once
    /// with empty values when nothing matches it.
    KeepAllPolygons,
    /// Only matched pairs.
    IntersectionOnly,
}

/// A tabular row with its (possibly absent) geometry attached.
#[derive(Debug, Clone)]
pub struct JoinedRecord {
    pub zip: CanonicalZip,
    pub year: Option<i32>,
    pub values: Vec<Value>,
    pub geometry: Option<Geometry<f64>>,
}

/// Join tabular rows to polygons on CanonicalZip equality. `polygons`
/// must already be deduplicated; if duplicates slip through, the first
/// occurrence wins here too rather than fanning out rows.
pub fn join(
    tabular: Vec<KeyedRow>,
    polygons: &[PolygonRecord],
    direction: JoinDirection,
) -> Vec<JoinedRecord> {
    let mut index: HashMap<&str, &Geometry<f64>> = HashMap::with_capacity(polygons.len());
    for record in polygons {
        index.entry(record.zip.as_str()).or_insert(&record.geometry);
    }

    let out = match direction {
        JoinDirection::KeepAllTabular => tabular
            .into_iter()
            .map(|row| {
                let geometry = index.get(row.zip.as_str()).map(|g| (*g).clone());
                JoinedRecord {
                    zip: row.zip,
                    year: Some(row.year),
                    values: row.values,
                    geometry,
                }
            })
            .collect(),
        JoinDirection::IntersectionOnly => tabular
            .into_iter()
            .filter_map(|row| {
                let geometry = index.get(row.zip.as_str()).map(|g| (*g).clone())?;
                Some(JoinedRecord {
                    zip: row.zip,
                    year: Some(row.year),
                    values: row.values,
                    geometry: Some(geometry),
                })
            })
            .collect(),
        JoinDirection::KeepAllPolygons => {
            let mut by_zip: HashMap<&str, Vec<&KeyedRow>> = HashMap::new();
            for row in &tabular {
                by_zip.entry(row.zip.as_str()).or_default().push(row);
            }
            let mut out = Vec::new();
            for record in polygons {
                match by_zip.get(record.zip.as_str()) {
                    Some(rows) => {
                        for row in rows {
                            out.push(JoinedRecord {
                                zip: row.zip.clone(),
                                year: Some(row.year),
                                values: row.values.clone(),
                                geometry: Some(record.geometry.clone()),
                            });
                        }
                    }
                    None => out.push(JoinedRecord {
                        zip: record.zip.clone(),
                        year: None,
                        values: Vec::new(),
                        geometry: Some(record.geometry.clone()),
                    }),
                }
            }
            out
        }
    };
    debug!(
        "join ({:?}): {} output rows, {} with geometry",
        direction,
        out.len(),
        out.iter().filter(|r| r.geometry.is_some()).count()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::normalize_zip;
    use geo::polygon;

    fn zip(raw: &str) -> CanonicalZip {
        normalize_zip(raw).into_zip().unwrap()
    }

    fn row(z: &str, year: i32) -> KeyedRow {
        KeyedRow {
            zip: zip(z),
            year,
            values: vec![Value::Num(1.0)],
        }
    }

    fn poly(z: &str) -> PolygonRecord {
        PolygonRecord {
            zip: zip(z),
            geometry: Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
            ]),
        }
    }

    #[test]
    fn keep_all_tabular_preserves_row_count() {
        let tabular = vec![row("33139", 2005), row("99999", 2005), row("33139", 2006)];
        let polygons = vec![poly("33139")];
        let out = join(tabular, &polygons, JoinDirection::KeepAllTabular);
        assert_eq!(out.len(), 3);
        assert!(out[0].geometry.is_some());
        assert!(out[1].geometry.is_none());
        assert!(out[2].geometry.is_some());
    }

    #[test]
    fn keep_all_tabular_with_zero_matching_polygons() {
        let tabular = vec![row("33139", 2005), row("33140", 2005)];
        let out = join(tabular, &[], JoinDirection::KeepAllTabular);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.geometry.is_none()));
    }

    #[test]
    fn intersection_only_drops_unmatched() {
        let tabular = vec![row("33139", 2005), row("99999", 2005)];
        let polygons = vec![poly("33139"), poly("00001")];
        let out = join(tabular, &polygons, JoinDirection::IntersectionOnly);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].zip.as_str(), "33139");
    }

    #[test]
    fn keep_all_polygons_emits_unmatched_polygon_once() {
        let tabular = vec![row("33139", 2005), row("33139", 2006)];
        let polygons = vec![poly("33139"), poly("00001")];
        let out = join(tabular, &polygons, JoinDirection::KeepAllPolygons);
        // Two matches for 33139, one empty row for 00001.
        assert_eq!(out.len(), 3);
        let empty = out.iter().find(|r| r.zip.as_str() == "00001").unwrap();
        assert!(empty.year.is_none());
        assert!(empty.values.is_empty());
    }

    #[test]
    fn join_is_string_keyed_not_numeric() {
        // "3216" canonicalizes to "03216"; a polygon carrying the same
        // canonical key matches regardless of how either was written.
        let tabular = vec![row("3216", 2010)];
        let polygons = vec![poly("03216")];
        let out = join(tabular, &polygons, JoinDirection::IntersectionOnly);
        assert_eq!(out.len(), 1);
    }
}

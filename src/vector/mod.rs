//! Polygon side of the pipeline: vector datasets with an attribute
//! table, one-geometry-per-ZIP deduplication, dissolve, and the
//! web-delivery simplification wrapper.

pub mod read;

pub use read::{read_shapefile, read_vector, read_zipped_bytes};

use anyhow::Result;
use geo::{BooleanOps, Geometry, MultiPolygon, Polygon, Simplify};
use serde_json::{Map, Value as Json};
use std::collections::HashSet;
use tracing::debug;

use crate::error::PipelineError;
use crate::ident::CanonicalZip;

/// One vector feature: attribute map plus geometry in lon/lat degrees.
#[derive(Debug, Clone)]
pub struct VectorFeature {
    pub properties: Map<String, Json>,
    pub geometry: Geometry<f64>,
}

impl VectorFeature {
    /// String rendering of an attribute, for identifier normalization.
    /// Null/missing renders empty (which normalizes to Absent).
    pub fn property_str(&self, name: &str) -> String {
        match self.properties.get(name) {
            None | Some(Json::Null) => String::new(),
            Some(Json::String(s)) => s.clone(),
            Some(Json::Number(n)) => n.to_string(),
            Some(Json::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Numeric attribute, tolerating numbers stored as text.
    pub fn property_num(&self, name: &str) -> Option<f64> {
        match self.properties.get(name)? {
            Json::Number(n) => n.as_f64(),
            Json::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A whole vector file: attribute column names (for candidate-column
/// resolution) plus features.
#[derive(Debug, Clone)]
pub struct VectorDataset {
    pub columns: Vec<String>,
    pub features: Vec<VectorFeature>,
}

impl VectorDataset {
    /// Case-insensitive column lookup (shapefile attribute names vary in
    /// case across producers).
    pub fn column_ignore_case(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(|c| c.as_str())
    }
}

/// A polygon keyed by its canonical ZIP, ready to join.
#[derive(Debug, Clone)]
pub struct PolygonRecord {
    pub zip: CanonicalZip,
    pub geometry: Geometry<f64>,
}

/// Keep exactly one geometry per CanonicalZip: first occurrence in input
/// order wins. Deterministic (the input order is the file order) and
/// idempotent. Skipping this before a join silently fans out tabular
/// rows once per duplicate polygon.
pub fn deduplicate_polygons(records: Vec<PolygonRecord>) -> Vec<PolygonRecord> {
    let mut seen: HashSet<CanonicalZip> = HashSet::with_capacity(records.len());
    let before = records.len();
    let kept: Vec<PolygonRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.zip.clone()))
        .collect();
    if kept.len() != before {
        debug!("deduplicated {} polygon rows to {}", before, kept.len());
    }
    kept
}

/// Dissolve many geometries into a single MultiPolygon (the state
/// boundary union, a storm cone, the world land mass). Non-areal
/// geometry is ignored; nothing areal at all is a DataQualityError.
pub fn dissolve(geometries: &[Geometry<f64>]) -> Result<MultiPolygon<f64>> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for geometry in geometries {
        match geometry {
            Geometry::Polygon(p) => polygons.push(p.clone()),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0.iter().cloned()),
            _ => {}
        }
    }
    let mut iter = polygons.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| PipelineError::DataQuality("no polygon geometry to dissolve".into()))?;
    let mut acc = MultiPolygon::new(vec![first]);
    for polygon in iter {
        acc = acc.union(&MultiPolygon::new(vec![polygon]));
    }
    Ok(acc)
}

/// Douglas-Peucker simplification with tolerance in degrees. Returns
/// `None` when the geometry collapses (ring fell under 4 coordinates);
/// callers drop those features and count them, never render them.
pub fn simplify_geometry(geometry: &Geometry<f64>, tolerance: f64) -> Option<Geometry<f64>> {
    if tolerance <= 0.0 {
        return Some(geometry.clone());
    }
    match geometry {
        Geometry::Polygon(p) => {
            let s = p.simplify(&tolerance);
            ring_ok(&s).then(|| Geometry::Polygon(s))
        }
        Geometry::MultiPolygon(mp) => {
            let kept: Vec<Polygon<f64>> = mp
                .0
                .iter()
                .map(|p| p.simplify(&tolerance))
                .filter(ring_ok)
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(Geometry::MultiPolygon(MultiPolygon::new(kept)))
            }
        }
        Geometry::LineString(l) => Some(Geometry::LineString(l.simplify(&tolerance))),
        Geometry::MultiLineString(ml) => {
            Some(Geometry::MultiLineString(ml.simplify(&tolerance)))
        }
        other => Some(other.clone()),
    }
}

fn ring_ok(p: &Polygon<f64>) -> bool {
    p.exterior().0.len() >= 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::normalize_zip;
    use geo::polygon;

    fn rec(zip: &str, x: f64) -> PolygonRecord {
        PolygonRecord {
            zip: normalize_zip(zip).into_zip().unwrap(),
            geometry: Geometry::Polygon(polygon![
                (x: x, y: 0.0),
                (x: x + 1.0, y: 0.0),
                (x: x + 1.0, y: 1.0),
                (x: x, y: 1.0),
            ]),
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let records = vec![rec("33139", 0.0), rec("33139", 10.0), rec("33140", 20.0)];
        let kept = deduplicate_polygons(records);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].zip.as_str(), "33139");
        // First occurrence survives, the x=10 duplicate is gone.
        match &kept[0].geometry {
            Geometry::Polygon(p) => assert_eq!(p.exterior().0[0].x, 0.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn dedupe_is_idempotent() {
        let records = vec![rec("33139", 0.0), rec("33139", 10.0), rec("33140", 20.0)];
        let once = deduplicate_polygons(records);
        let twice = deduplicate_polygons(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.zip, b.zip);
        }
    }

    #[test]
    fn dissolve_merges_touching_squares() {
        let geoms = vec![rec("00001", 0.0).geometry, rec("00002", 1.0).geometry];
        let merged = dissolve(&geoms).unwrap();
        // Two adjacent unit squares union into one 2x1 polygon.
        assert_eq!(merged.0.len(), 1);
    }

    #[test]
    fn dissolve_without_polygons_fails() {
        let geoms = vec![Geometry::Point(geo::Point::new(0.0, 0.0))];
        assert!(dissolve(&geoms).is_err());
        assert!(dissolve(&[]).is_err());
    }

    #[test]
    fn simplify_keeps_valid_rings() {
        let g = rec("33139", 0.0).geometry;
        let s = simplify_geometry(&g, 0.0005).expect("square survives");
        match s {
            Geometry::Polygon(p) => assert!(p.exterior().0.len() >= 4),
            _ => unreachable!(),
        }
    }

    #[test]
    fn zero_tolerance_passes_through() {
        let g = rec("33139", 0.0).geometry;
        assert_eq!(
            format!("{:?}", simplify_geometry(&g, 0.0).unwrap()),
            format!("{:?}", g)
        );
    }
}

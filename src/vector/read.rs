//! Vector-file ingestion: GeoJSON, ESRI shapefile, or a zip archive
//! wrapping either (Census TIGER and cartographic-boundary downloads
//! ship zipped). All geometry comes out as `geo` types in lon/lat
//! degrees; a projected CRS is rejected, not guessed at.

use anyhow::{bail, Context, Result};
use geo::Geometry;
use serde_json::{Map, Value as Json};
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::PipelineError;

use super::{VectorDataset, VectorFeature};

/// Read a vector dataset, dispatching on extension: `.geojson`/`.json`,
/// `.shp`, or `.zip` containing either.
pub fn read_vector(path: &Path) -> Result<VectorDataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "geojson" | "json" => read_geojson(path),
        "shp" => read_shapefile(path),
        "zip" => read_zipped(path),
        other => bail!(
            "unsupported vector format `.{}` for {} (expected .geojson, .shp, or .zip)",
            other,
            path.display()
        ),
    }
}

pub fn read_geojson(path: &Path) -> Result<VectorDataset> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let collection: geojson::FeatureCollection = text
        .parse()
        .with_context(|| format!("parsing GeoJSON {}", path.display()))?;

    let mut features = Vec::with_capacity(collection.features.len());
    // GeoJSON carries no schema: properties can differ per feature, so
    // the column list is the union of keys across every feature, in
    // first-seen order.
    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(g) => Geometry::<f64>::try_from(g.value)
                .with_context(|| format!("unsupported geometry in {}", path.display()))?,
            None => continue,
        };
        let properties = feature.properties.unwrap_or_default();
        for key in properties.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
        features.push(VectorFeature {
            properties,
            geometry,
        });
    }
    debug!(
        "read {} features from GeoJSON {}",
        features.len(),
        path.display()
    );
    Ok(VectorDataset { columns, features })
}

pub fn read_shapefile(path: &Path) -> Result<VectorDataset> {
    check_prj(path)?;
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("opening shapefile {}", path.display()))?;

    let mut features = Vec::new();
    let mut columns: Vec<String> = Vec::new();
    for pair in reader.iter_shapes_and_records() {
        let (shape, record) =
            pair.with_context(|| format!("reading feature of {}", path.display()))?;
        let geometry = match shape_to_geometry(shape) {
            Some(g) => g,
            None => continue,
        };
        let mut properties = Map::new();
        for (name, value) in record {
            properties.insert(name, field_to_json(value));
        }
        if columns.is_empty() {
            // serde_json::Map iterates sorted, so the column order is
            // deterministic even though dbase hands fields back unordered.
            columns = properties.keys().cloned().collect();
        }
        features.push(VectorFeature {
            properties,
            geometry,
        });
    }
    debug!(
        "read {} features from shapefile {}",
        features.len(),
        path.display()
    );
    Ok(VectorDataset { columns, features })
}

/// Read a zip archive containing a shapefile (or a GeoJSON). Members are
/// staged into a temp directory so the shapefile reader can find the
/// `.dbf`/`.shx`/`.prj` sidecars next to the `.shp`.
pub fn read_zipped(path: &Path) -> Result<VectorDataset> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading archive {}", path.display()))?;

    let staging = tempfile::tempdir().context("creating staging directory")?;
    let mut shp_path: Option<PathBuf> = None;
    let mut geojson_path: Option<PathBuf> = None;

    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let name = match Path::new(entry.name()).file_name().and_then(|n| n.to_str()) {
            Some(n) if !n.starts_with('.') => n.to_string(),
            _ => continue,
        };
        let lower = name.to_ascii_lowercase();
        let interesting = lower.ends_with(".shp")
            || lower.ends_with(".dbf")
            || lower.ends_with(".shx")
            || lower.ends_with(".prj")
            || lower.ends_with(".geojson")
            || lower.ends_with(".json");
        if !interesting {
            continue;
        }
        let dest = staging.path().join(&name);
        let mut out = File::create(&dest)
            .with_context(|| format!("staging archive member {}", name))?;
        io::copy(&mut entry, &mut out)?;
        if lower.ends_with(".shp") {
            shp_path = Some(dest);
        } else if lower.ends_with(".geojson") || lower.ends_with(".json") {
            geojson_path = Some(dest);
        }
    }

    if let Some(shp) = shp_path {
        return read_shapefile(&shp);
    }
    if let Some(gj) = geojson_path {
        return read_geojson(&gj);
    }
    bail!(
        "archive {} contains neither a .shp nor a .geojson member",
        path.display()
    )
}

/// Accept only geographic (lon/lat) shapefiles. The TIGER/cartographic
/// inputs are NAD83 or WGS84 degrees; a projected CRS would need a
/// reprojection engine this pipeline deliberately does not carry, so it
/// fails loudly instead of producing coordinates the map cannot render.
fn check_prj(shp_path: &Path) -> Result<()> {
    let prj_path = shp_path.with_extension("prj");
    let wkt = match fs::read_to_string(&prj_path) {
        Ok(text) => text,
        Err(_) => {
            debug!(
                "no .prj next to {}; assuming lon/lat degrees",
                shp_path.display()
            );
            return Ok(());
        }
    };
    let upper = wkt.to_uppercase();
    if upper.contains("PROJCS") || upper.contains("PROJCRS") {
        let head: String = wkt.chars().take(80).collect();
        return Err(PipelineError::Schema(format!(
            "{} is in a projected CRS ({}…); reproject to lon/lat (EPSG:4326) first",
            shp_path.display(),
            head.trim()
        ))
        .into());
    }
    if !upper.contains("WGS") && !upper.contains("NAD83") && !upper.contains("GCS") {
        warn!(
            "unrecognized geographic CRS for {}; treating coordinates as lon/lat",
            shp_path.display()
        );
    }
    Ok(())
}

fn shape_to_geometry(shape: Shape) -> Option<Geometry<f64>> {
    match shape {
        Shape::NullShape => None,
        Shape::Point(p) => Some(Geometry::Point(p.into())),
        Shape::Multipoint(m) => Some(Geometry::MultiPoint(m.into())),
        Shape::Polyline(l) => Some(Geometry::MultiLineString(l.into())),
        Shape::Polygon(p) => Some(Geometry::MultiPolygon(p.into())),
        other => {
            warn!("skipping unsupported shape type {}", other.shapetype());
            None
        }
    }
}

fn field_to_json(value: FieldValue) -> Json {
    match value {
        FieldValue::Character(Some(s)) => Json::String(s.trim().to_string()),
        FieldValue::Character(None) => Json::Null,
        FieldValue::Numeric(Some(n)) => json_num(n),
        FieldValue::Numeric(None) => Json::Null,
        FieldValue::Float(Some(f)) => json_num(f as f64),
        FieldValue::Float(None) => Json::Null,
        FieldValue::Integer(i) => Json::from(i),
        FieldValue::Logical(Some(b)) => Json::Bool(b),
        FieldValue::Logical(None) => Json::Null,
        other => Json::String(format!("{:?}", other)),
    }
}

fn json_num(n: f64) -> Json {
    serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
}

/// Read a lump of bytes as an in-memory zip and stage it to disk first;
/// used by the world-land tool which downloads its input.
pub fn read_zipped_bytes(bytes: &[u8]) -> Result<VectorDataset> {
    let mut staged = tempfile::NamedTempFile::with_suffix(".zip")
        .context("staging downloaded archive")?;
    io::Write::write_all(&mut staged, bytes)?;
    read_zipped(staged.path())
}

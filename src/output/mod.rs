//! All-or-nothing file output. Every tool writes to a temp file in the
//! destination directory and renames it into place, so a failed run
//! never leaves a truncated file for a downstream tool to consume.

use anyhow::{Context, Result};
use geo::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::{Map, Value as Json};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Write `bytes` to `path` atomically, creating parent directories.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    let dir = parent.unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("renaming temp file into {}", path.display()))?;
    Ok(())
}

/// Assemble one GeoJSON feature from a property map and a geometry.
pub fn feature(properties: Map<String, Json>, geometry: &Geometry<f64>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Write a FeatureCollection atomically.
pub fn write_geojson(path: &Path, features: Vec<Feature>) -> Result<()> {
    let count = features.len();
    let collection = GeoJson::from(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    });
    atomic_write(path, collection.to_string().as_bytes())?;
    info!("wrote {} with {} features", path.display(), count);
    Ok(())
}

/// Write a CSV atomically from a header row and stringified rows.
pub fn write_csv(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().context("flushing CSV buffer")?;
    atomic_write(path, &bytes)?;
    info!("wrote {} with {} rows", path.display(), rows.len());
    Ok(())
}

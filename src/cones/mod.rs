//! Storm-cone assembly: one dissolved cone polygon per storm, named and
//! classified, ready for the overlay layer. Per-storm inputs arrive as
//! folders like `Wilma_2005/` holding `hurricane_cone.shp` and
//! optionally `hurricane_points.shp` with a MAXWIND column.

use anyhow::{Context, Result};
use geo::MultiPolygon;
use glob::glob;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::ident::YearRange;
use crate::table::read_csv;
use crate::vector::{dissolve, read_shapefile, VectorDataset};

static STORM_FOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)[ _-]?((?:19|20)\d{2})").unwrap());

/// Saffir-Simpson boundary: sustained winds of 64 kt make a hurricane.
const HURRICANE_KNOTS: f64 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StormType {
    Hurricane,
    Tropical,
}

impl StormType {
    pub fn parse(raw: &str) -> Option<StormType> {
        match raw.trim().to_lowercase().as_str() {
            "hurricane" => Some(StormType::Hurricane),
            "tropical" => Some(StormType::Tropical),
            _ => None,
        }
    }
}

impl fmt::Display for StormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StormType::Hurricane => f.write_str("hurricane"),
            StormType::Tropical => f.write_str("tropical"),
        }
    }
}

/// `WILMA_2005`, `Wilma 2005`, `wilma-2005` → ("WILMA", 2005).
pub fn parse_storm_folder(name: &str) -> Option<(String, i32)> {
    let caps = STORM_FOLDER.captures(name)?;
    let storm = caps.get(1)?.as_str().to_uppercase();
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((storm, year))
}

/// One row of the optional storm metadata CSV (`name,year,storm_type`).
#[derive(Debug, Clone)]
pub struct StormMeta {
    pub name: String,
    pub year: i32,
    pub storm_type: Option<StormType>,
}

/// Load and normalize the metadata table: names upper-cased and
/// trimmed, types lower-cased, unparseable years skipped.
pub fn load_meta(path: &Path) -> Result<Vec<StormMeta>> {
    let table = read_csv(path)?;
    let name_idx = table.column("name")?;
    let year_idx = table.column("year")?;
    let type_idx = table.column("storm_type")?;
    let mut rows = Vec::with_capacity(table.rows.len());
    for record in &table.rows {
        let year: i32 = match table.field(record, year_idx).trim().parse() {
            Ok(y) => y,
            Err(_) => continue,
        };
        rows.push(StormMeta {
            name: table.field(record, name_idx).trim().to_uppercase(),
            year,
            storm_type: StormType::parse(table.field(record, type_idx)),
        });
    }
    Ok(rows)
}

/// Classify a storm from its track points: the maximum MAXWIND value
/// decides hurricane vs tropical. No wind data means no classification.
pub fn classify_from_winds(points: &VectorDataset) -> Option<StormType> {
    let column = points.column_ignore_case("MAXWIND")?.to_string();
    let max = points
        .features
        .iter()
        .filter_map(|f| f.property_num(&column))
        .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |m| m.max(v))));
    match max {
        Some(w) if w >= HURRICANE_KNOTS => Some(StormType::Hurricane),
        Some(w) if w > 0.0 => Some(StormType::Tropical),
        _ => None,
    }
}

/// One assembled storm: dissolved cone geometry plus identity.
#[derive(Debug, Clone)]
pub struct StormCone {
    pub name: String,
    pub year: i32,
    pub storm_type: Option<StormType>,
    pub geometry: MultiPolygon<f64>,
}

/// Walk per-storm subfolders of `src` (sorted, so runs are
/// reproducible), dissolve each cone, and classify. Folders that cannot
/// contribute are logged and skipped; an entirely empty result is fatal.
pub fn assemble_cones(
    src: &Path,
    meta: &[StormMeta],
    years: YearRange,
) -> Result<Vec<StormCone>> {
    let pattern = format!("{}/*", src.display());
    let mut folders: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("invalid storm folder pattern {}", pattern))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("cannot read storm folder entry: {:?}", e);
                None
            }
        })
        .filter(|p| p.is_dir())
        .collect();
    if folders.is_empty() {
        return Err(
            PipelineError::Configuration(format!("no subfolders found in {}", src.display()))
                .into(),
        );
    }
    folders.sort();

    let mut cones = Vec::new();
    for folder in folders {
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (name, year) = match parse_storm_folder(&folder_name) {
            Some(parsed) => parsed,
            None => {
                warn!("{}: folder name has no NAME+YEAR, skipped", folder_name);
                continue;
            }
        };
        if !years.contains(year) {
            info!("{}: year {} outside panel, skipped", folder_name, year);
            continue;
        }
        let cone_path = folder.join("hurricane_cone.shp");
        if !cone_path.exists() {
            warn!("{}: no hurricane_cone.shp, skipped", folder_name);
            continue;
        }
        let cone = match read_shapefile(&cone_path) {
            Ok(ds) => ds,
            Err(e) => {
                warn!("{}: reading cone failed: {:#}", folder_name, e);
                continue;
            }
        };
        let geoms: Vec<_> = cone.features.iter().map(|f| f.geometry.clone()).collect();
        let geometry = match dissolve(&geoms) {
            Ok(g) => g,
            Err(_) => {
                warn!("{}: no polygon geometry in cone, skipped", folder_name);
                continue;
            }
        };

        let storm_type = meta
            .iter()
            .find(|m| m.name == name && m.year == year)
            .and_then(|m| m.storm_type)
            .or_else(|| {
                let points_path = folder.join("hurricane_points.shp");
                points_path
                    .exists()
                    .then(|| read_shapefile(&points_path).ok())
                    .flatten()
                    .as_ref()
                    .and_then(classify_from_winds)
            });

        info!("{}: cone added (type={:?})", folder_name, storm_type);
        cones.push(StormCone {
            name,
            year,
            storm_type,
            geometry,
        });
    }

    if cones.is_empty() {
        return Err(PipelineError::DataQuality("no cones assembled".into()).into());
    }
    Ok(cones)
}

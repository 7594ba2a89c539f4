//! Assemble per-storm forecast-cone shapefiles into one simplified
//! GeoJSON overlay, classifying each storm as hurricane or tropical
//! from a metadata CSV or, failing that, its track winds.

use anyhow::Result;
use clap::Parser;
use geo::Geometry;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use evmap::cones::{assemble_cones, load_meta, StormMeta};
use evmap::ident::YearRange;
use evmap::output::{feature, write_geojson};
use evmap::vector::simplify_geometry;
use evmap::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "build_storm_cones")]
#[command(about = "Union per-storm cone shapefiles into one GeoJSON overlay")]
struct Args {
    /// Folder with per-storm subfolders (each holding hurricane_cone.shp)
    #[arg(long)]
    src: PathBuf,

    /// Output GeoJSON
    #[arg(long)]
    out: PathBuf,

    /// Optional CSV with columns name,year,storm_type
    #[arg(long)]
    meta: Option<PathBuf>,

    #[arg(long, default_value_t = 2004)]
    min_year: i32,

    #[arg(long, default_value_t = 2016)]
    max_year: i32,

    /// Simplification tolerance in degrees (0.02 is roughly 2.2 km)
    #[arg(long, default_value_t = 0.02)]
    simplify: f64,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let meta: Vec<StormMeta> = match &args.meta {
        Some(path) => load_meta(path)?,
        None => Vec::new(),
    };

    let years = YearRange::new(args.min_year, args.max_year);
    let cones = assemble_cones(&args.src, &meta, years)?;

    let mut features = Vec::with_capacity(cones.len());
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut year_span: Option<(i32, i32)> = None;
    for cone in &cones {
        let geometry = Geometry::MultiPolygon(cone.geometry.clone());
        let simplified = match simplify_geometry(&geometry, args.simplify) {
            Some(g) => g,
            None => {
                warn!("{} {}: cone collapsed at tolerance {}", cone.name, cone.year, args.simplify);
                continue;
            }
        };
        let type_label = cone
            .storm_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        *by_type.entry(type_label).or_insert(0) += 1;
        year_span = Some(match year_span {
            Some((lo, hi)) => (lo.min(cone.year), hi.max(cone.year)),
            None => (cone.year, cone.year),
        });

        let mut properties = Map::new();
        properties.insert("name".into(), Json::String(cone.name.clone()));
        properties.insert("year".into(), Json::from(cone.year));
        properties.insert(
            "storm_type".into(),
            cone.storm_type
                .map_or(Json::Null, |t| Json::String(t.to_string())),
        );
        features.push(feature(properties, &simplified));
    }

    if features.is_empty() {
        return Err(PipelineError::DataQuality(format!(
            "all {} cones collapsed at simplify tolerance {}",
            cones.len(),
            args.simplify
        ))
        .into());
    }
    write_geojson(&args.out, features)?;

    info!("counts by storm_type: {:?}", by_type);
    if let Some((lo, hi)) = year_span {
        info!("year span: {}-{}", lo, hi);
    }
    info!("simplify tolerance: {}", args.simplify);
    Ok(())
}

//! Build the world land basemap layer: download (or read) the Natural
//! Earth 110m land shapefile, dissolve it to a single feature, simplify
//! it, and write GeoJSON.

use anyhow::{Context, Result};
use clap::Parser;
use geo::Geometry;
use serde_json::{Map, Value as Json};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use evmap::output::{feature, write_geojson};
use evmap::vector::{dissolve, read_vector, read_zipped_bytes, simplify_geometry};
use evmap::PipelineError;

const NE_LAND_URL: &str =
    "https://naturalearth.s3.amazonaws.com/110m_physical/ne_110m_land.zip";

#[derive(Parser, Debug)]
#[command(name = "build_world_land")]
#[command(about = "Dissolve Natural Earth land polygons into one basemap feature")]
struct Args {
    /// Source: an http(s) URL to a zipped shapefile, or a local path
    #[arg(long, default_value = NE_LAND_URL)]
    src: String,

    /// Output GeoJSON
    #[arg(long, default_value = "docs/base/world_land_110m.min.geojson")]
    out: PathBuf,

    /// Simplification tolerance in degrees; 0 disables
    #[arg(long, default_value_t = 0.05)]
    simplify: f64,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();

    let dataset = if args.src.starts_with("http://") || args.src.starts_with("https://") {
        info!("downloading {}", args.src);
        let response = reqwest::blocking::get(&args.src)
            .with_context(|| format!("downloading {}", args.src))?;
        if !response.status().is_success() {
            return Err(PipelineError::Configuration(format!(
                "download of {} failed with HTTP {}",
                args.src,
                response.status()
            ))
            .into());
        }
        let bytes = response.bytes().context("reading download body")?;
        info!("downloaded {} bytes", bytes.len());
        read_zipped_bytes(&bytes)?
    } else {
        read_vector(Path::new(&args.src))?
    };
    info!("read {} land features", dataset.features.len());

    let geometries: Vec<Geometry<f64>> = dataset
        .features
        .iter()
        .map(|f| f.geometry.clone())
        .collect();
    let land = Geometry::MultiPolygon(dissolve(&geometries)?);
    let land = simplify_geometry(&land, args.simplify).ok_or_else(|| {
        PipelineError::DataQuality(format!(
            "land mass collapsed at simplify tolerance {}",
            args.simplify
        ))
    })?;

    let mut properties = Map::new();
    properties.insert("featurecla".into(), Json::String("land".into()));
    write_geojson(&args.out, vec![feature(properties, &land)])?;
    Ok(())
}

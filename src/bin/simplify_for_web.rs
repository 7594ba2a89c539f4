//! Slim a joined GeoJSON for web delivery: keep only the mapped
//! attributes and simplify geometry to a degree tolerance.

use anyhow::Result;
use clap::Parser;
use serde_json::Map;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use evmap::output::{feature, write_geojson};
use evmap::vector::{read_vector, simplify_geometry};
use evmap::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "simplify_for_web")]
#[command(about = "Trim attributes and simplify geometry for the web map")]
struct Args {
    /// Input GeoJSON (the full joined build)
    #[arg(long)]
    input: PathBuf,

    /// Output GeoJSON
    #[arg(long)]
    out: PathBuf,

    /// Tolerance in degrees (0.0005 is roughly 55 m)
    #[arg(long, default_value_t = 0.0005)]
    tolerance: f64,

    /// Properties to keep, comma separated
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "zip,year,filings,evict,households,filing_rate,evict_rate,treated_hurr,treated_ts,storm_name"
    )]
    keep: Vec<String>,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let dataset = read_vector(&args.input)?;
    let total = dataset.features.len();
    info!("read {} features from {}", total, args.input.display());

    let mut collapsed = 0usize;
    let mut features = Vec::with_capacity(total);
    for f in dataset.features {
        let geometry = match simplify_geometry(&f.geometry, args.tolerance) {
            Some(g) => g,
            None => {
                collapsed += 1;
                continue;
            }
        };
        let mut properties = Map::new();
        for name in &args.keep {
            if let Some(value) = f.properties.get(name) {
                properties.insert(name.clone(), value.clone());
            }
        }
        features.push(feature(properties, &geometry));
    }

    if collapsed > 0 {
        warn!(
            "{} of {} features collapsed at tolerance {} and were dropped",
            collapsed, total, args.tolerance
        );
    }
    if features.is_empty() {
        return Err(PipelineError::DataQuality(format!(
            "every feature collapsed at simplify tolerance {}",
            args.tolerance
        ))
        .into());
    }
    write_geojson(&args.out, features)?;
    Ok(())
}

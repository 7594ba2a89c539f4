//! Diagnostic: trial-join the ZIP×year CSV against ZCTA polygons and
//! report how many rows would come out with geometry. Fails only when
//! nothing matches at all.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use evmap::ident::{
    normalize_year, normalize_zip, resolve_identifier_column, YearRange, ZipStats,
    ZCTA_ID_CANDIDATES,
};
use evmap::join::{join, JoinDirection};
use evmap::table::{read_csv, KeyedRow};
use evmap::vector::{deduplicate_polygons, read_vector, PolygonRecord};
use evmap::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "check_join")]
#[command(about = "Report how many CSV rows match a ZCTA polygon")]
struct Args {
    #[arg(long)]
    csv: PathBuf,

    #[arg(long)]
    zcta: PathBuf,

    #[arg(long, default_value = "zip")]
    zip_col: String,

    #[arg(long, default_value = "year")]
    year_col: String,

    /// Override the ZCTA identifier column instead of the candidate list
    #[arg(long)]
    zcta_col: Option<String>,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();

    let table = read_csv(&args.csv)?;
    let zip_idx = table.column(&args.zip_col)?;
    let year_idx = table.column(&args.year_col)?;
    let any_year = YearRange::new(0, 9999);
    let mut stats = ZipStats::default();
    let keyed: Vec<KeyedRow> = table
        .rows
        .iter()
        .filter_map(|row| {
            let outcome = normalize_zip(table.field(row, zip_idx));
            stats.record(&outcome);
            Some(KeyedRow {
                zip: outcome.into_zip()?,
                year: normalize_year(table.field(row, year_idx), any_year)?,
                values: Vec::new(),
            })
        })
        .collect();
    stats.log_summary("csv zip column");
    info!("CSV rows usable for join: {}", keyed.len());

    let zcta = read_vector(&args.zcta)?;
    let id_column = match &args.zcta_col {
        Some(name) => resolve_identifier_column(&zcta.columns, &[name.as_str()])?,
        None => resolve_identifier_column(&zcta.columns, ZCTA_ID_CANDIDATES)?,
    };
    let polygons: Vec<PolygonRecord> = zcta
        .features
        .iter()
        .filter_map(|f| {
            Some(PolygonRecord {
                zip: normalize_zip(&f.property_str(&id_column)).into_zip()?,
                geometry: f.geometry.clone(),
            })
        })
        .collect();
    let polygons = deduplicate_polygons(polygons);
    info!(
        "polygon features: {} ({} unique ZIPs, identifier column {})",
        zcta.features.len(),
        polygons.len(),
        id_column
    );

    let joined = join(keyed, &polygons, JoinDirection::KeepAllTabular);
    let matched = joined.iter().filter(|r| r.geometry.is_some()).count();
    let missing = joined.len() - matched;
    info!(
        "after join: matched rows with geometry = {}, missing = {} (of {})",
        matched,
        missing,
        joined.len()
    );

    if missing > 0 {
        warn!("examples missing geometry:");
        for record in joined.iter().filter(|r| r.geometry.is_none()).take(10) {
            warn!("  zip={} year={}", record.zip, record.year.unwrap_or_default());
        }
    } else {
        info!("looks good: all rows have geometry");
    }

    if matched == 0 {
        return Err(
            PipelineError::DataQuality("no CSV row matched any ZCTA polygon".into()).into(),
        );
    }
    Ok(())
}

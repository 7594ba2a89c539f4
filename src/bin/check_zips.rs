//! Diagnostic: compare the set of ZIP keys in the CSV against the set
//! in the polygon file, with samples of each side's unmatched keys.

use anyhow::Result;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use evmap::ident::{
    normalize_zip, resolve_identifier_column, ZipStats, ZCTA_ID_CANDIDATES,
};
use evmap::table::read_csv;
use evmap::vector::read_vector;

#[derive(Parser, Debug)]
#[command(name = "check_zips")]
#[command(about = "Compare ZIP key sets between a CSV and a polygon file")]
struct Args {
    #[arg(long)]
    csv: PathBuf,

    #[arg(long)]
    zcta: PathBuf,

    #[arg(long, default_value = "zip")]
    zip_col: String,

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
    let mut csv_stats = ZipStats::default();
    let csv_zips: BTreeSet<String> = table
        .rows
        .iter()
        .filter_map(|row| {
            let outcome = normalize_zip(table.field(row, zip_idx));
            csv_stats.record(&outcome);
            outcome.into_zip().map(|z| z.to_string())
        })
        .collect();
    csv_stats.log_summary("csv zip column");
    info!("CSV rows: {}", table.rows.len());
    info!("CSV unique ZIPs: {}", csv_zips.len());
    info!(
        "CSV sample ZIPs: {:?}",
        csv_zips.iter().take(10).collect::<Vec<_>>()
    );

    let zcta = read_vector(&args.zcta)?;
    let id_column = match &args.zcta_col {
        Some(name) => resolve_identifier_column(&zcta.columns, &[name.as_str()])?,
        None => resolve_identifier_column(&zcta.columns, ZCTA_ID_CANDIDATES)?,
    };
    let mut shp_stats = ZipStats::default();
    let shp_zips: BTreeSet<String> = zcta
        .features
        .iter()
        .filter_map(|f| {
            let outcome = normalize_zip(&f.property_str(&id_column));
            shp_stats.record(&outcome);
            outcome.into_zip().map(|z| z.to_string())
        })
        .collect();
    shp_stats.log_summary("zcta identifier column");
    info!("polygon features: {}", zcta.features.len());
    info!("polygon unique ZIPs: {}", shp_zips.len());
    info!(
        "polygon sample ZIPs: {:?}",
        shp_zips.iter().take(10).collect::<Vec<_>>()
    );

    let intersection = csv_zips.intersection(&shp_zips).count();
    info!("intersection ZIPs count: {}", intersection);
    info!(
        "first 20 ZIPs in CSV but not in polygons: {:?}",
        csv_zips.difference(&shp_zips).take(20).collect::<Vec<_>>()
    );
    info!(
        "first 20 ZIPs in polygons but not in CSV: {:?}",
        shp_zips.difference(&csv_zips).take(20).collect::<Vec<_>>()
    );
    if intersection == 0 {
        warn!("the two key sets are disjoint; a join would produce nothing");
    }
    Ok(())
}

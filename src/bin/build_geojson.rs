//! Join the ZIP×year eviction table onto ZCTA polygons and export a
//! GeoJSON ready for tiling. Optionally clips the polygon universe to
//! one state's dissolved boundary first.

use anyhow::Result;
use clap::Parser;
use geo::Intersects;
use serde_json::{Map, Value as Json};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use evmap::ident::{
    normalize_year, normalize_zip, resolve_identifier_column, YearRange, ZipStats,
    STATE_NAME_CANDIDATES, ZCTA_ID_CANDIDATES,
};
use evmap::join::{join, JoinDirection};
use evmap::output::{feature, write_geojson};
use evmap::table::{parse_num, rate, read_csv, KeyedRow, Value};
use evmap::vector::{deduplicate_polygons, dissolve, read_vector, PolygonRecord};
use evmap::PipelineError;

/// Extra CSV columns carried onto the map when present.
const PASSTHROUGH: &[&str] = &[
    "evict",
    "evict_rate",
    "treated_hurr",
    "treated_ts",
    "storm_name",
];

#[derive(Parser, Debug)]
#[command(name = "build_geojson")]
#[command(about = "Join a ZIP x year CSV to ZCTA polygons and write GeoJSON")]
struct Args {
    /// ZIP x year table
    #[arg(long)]
    csv: PathBuf,

    /// ZCTA polygons (.geojson, .shp, or zipped shapefile)
    #[arg(long)]
    zcta: PathBuf,

    /// Optional state boundary file used to clip the ZCTA universe
    #[arg(long)]
    states: Option<PathBuf>,

    #[arg(long, default_value = "Florida")]
    state_name: String,

    #[arg(long, default_value = "zip")]
    zip_col: String,

    #[arg(long, default_value = "year")]
    year_col: String,

    #[arg(long, default_value = "filings")]
    filings_col: String,

    #[arg(long, default_value = "households")]
    households_col: String,

    /// Override the ZCTA identifier column instead of the candidate list
    #[arg(long)]
    zcta_col: Option<String>,

    /// Output GeoJSON
    #[arg(long)]
    out: PathBuf,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();

    // ── tabular side ────────────────────────────────────────────────
    let table = read_csv(&args.csv)?;
    let zip_idx = table.column(&args.zip_col)?;
    let year_idx = table.column(&args.year_col)?;
    let filings_idx = table.column(&args.filings_col)?;
    let households_idx = table.column(&args.households_col)?;
    let passthrough: Vec<(String, usize)> = PASSTHROUGH
        .iter()
        .filter_map(|name| table.column_opt(name).map(|idx| (name.to_string(), idx)))
        .collect();
    info!(
        "read {} rows from {} (passthrough columns: {:?})",
        table.rows.len(),
        args.csv.display(),
        passthrough.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>()
    );

    // The CSV is already one row per ZIP-year; years here only need to
    // be integers, not re-filtered to the panel.
    let any_year = YearRange::new(0, 9999);
    let mut csv_stats = ZipStats::default();
    let mut keyed = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let outcome = normalize_zip(table.field(row, zip_idx));
        csv_stats.record(&outcome);
        let zip = match outcome.into_zip() {
            Some(z) => z,
            None => continue,
        };
        let year = match normalize_year(table.field(row, year_idx), any_year) {
            Some(y) => y,
            None => continue,
        };
        let filings = parse_num(table.field(row, filings_idx));
        let households = parse_num(table.field(row, households_idx));
        let filing_rate = rate(filings, households);

        let mut values = vec![
            filings.map_or(Value::Absent, Value::Num),
            households.map_or(Value::Absent, Value::Num),
            filing_rate.map_or(Value::Absent, Value::Num),
        ];
        for (_, idx) in &passthrough {
            let raw = table.field(row, *idx);
            values.push(if raw.trim().is_empty() {
                Value::Absent
            } else if let Some(n) = parse_num(raw) {
                Value::Num(n)
            } else {
                Value::Text(raw.to_string())
            });
        }
        keyed.push(KeyedRow { zip, year, values });
    }
    csv_stats.log_summary("csv zip column");
    let tabular_count = keyed.len();

    // ── polygon side ────────────────────────────────────────────────
    let zcta = read_vector(&args.zcta)?;
    let id_column = match &args.zcta_col {
        Some(name) => resolve_identifier_column(&zcta.columns, &[name.as_str()])?,
        None => resolve_identifier_column(&zcta.columns, ZCTA_ID_CANDIDATES)?,
    };
    info!(
        "{}: {} features, identifier column {}",
        args.zcta.display(),
        zcta.features.len(),
        id_column
    );

    let mut zcta_stats = ZipStats::default();
    let mut polygons: Vec<PolygonRecord> = Vec::with_capacity(zcta.features.len());
    for f in &zcta.features {
        let outcome = normalize_zip(&f.property_str(&id_column));
        zcta_stats.record(&outcome);
        if let Some(zip) = outcome.into_zip() {
            polygons.push(PolygonRecord {
                zip,
                geometry: f.geometry.clone(),
            });
        }
    }
    zcta_stats.log_summary("zcta identifier column");

    if let Some(states_path) = &args.states {
        let states = read_vector(states_path)?;
        let name_column = resolve_identifier_column(&states.columns, STATE_NAME_CANDIDATES)?;
        let matched: Vec<_> = states
            .features
            .iter()
            .filter(|f| f.property_str(&name_column) == args.state_name)
            .map(|f| f.geometry.clone())
            .collect();
        if matched.is_empty() {
            return Err(PipelineError::DataQuality(format!(
                "could not find state named '{}' in {}",
                args.state_name,
                states_path.display()
            ))
            .into());
        }
        let boundary = dissolve(&matched)?;
        let before = polygons.len();
        polygons.retain(|p| p.geometry.intersects(&boundary));
        info!(
            "state clip '{}': kept {} of {} ZCTAs",
            args.state_name,
            polygons.len(),
            before
        );
    }

    let polygons = deduplicate_polygons(polygons);

    // ── join & write ────────────────────────────────────────────────
    // Keep every tabular row, then drop the geometry-less ones with a
    // visible count: absent geometry is unmappable, not renderable.
    let joined = join(keyed, &polygons, JoinDirection::KeepAllTabular);
    debug_assert_eq!(joined.len(), tabular_count);
    let unmatched = joined.iter().filter(|r| r.geometry.is_none()).count();
    if unmatched > 0 {
        warn!(
            "{} of {} tabular rows had no matching ZCTA polygon and were dropped",
            unmatched, tabular_count
        );
    }

    let mut features = Vec::with_capacity(joined.len() - unmatched);
    for record in joined {
        let geometry = match record.geometry {
            Some(g) => g,
            None => continue,
        };
        let mut properties = Map::new();
        properties.insert("zip".into(), Json::String(record.zip.to_string()));
        properties.insert("year".into(), Json::from(record.year.unwrap_or_default()));
        let names: Vec<&str> = ["filings", "households", "filing_rate"]
            .into_iter()
            .chain(passthrough.iter().map(|(n, _)| n.as_str()))
            .collect();
        for (name, value) in names.iter().zip(record.values.iter()) {
            properties.insert((*name).to_string(), value_to_json(value));
        }
        features.push(feature(properties, &geometry));
    }
    if features.is_empty() {
        return Err(PipelineError::DataQuality(
            "no tabular rows matched any ZCTA polygon".into(),
        )
        .into());
    }
    write_geojson(&args.out, features)?;
    Ok(())
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Num(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
        Value::Text(s) => Json::String(s.clone()),
        Value::Absent => Json::Null,
    }
}

//! Aggregate raw tract/week eviction records to one row per ZIP × year,
//! with filing/eviction counts summed, households averaged, and rates
//! recomputed from the aggregated numerator and denominator.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use evmap::ident::{normalize_year, normalize_zip, YearRange, ZipStats};
use evmap::output::write_csv;
use evmap::table::{aggregate, parse_num, rate, read_csv, KeyedRow, Reducer, Value};
use evmap::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "prep_zip_year")]
#[command(about = "Aggregate raw eviction records to a ZIP x year table")]
struct Args {
    /// Raw eviction CSV (one row per tract/week)
    #[arg(long)]
    input: PathBuf,

    /// Output ZIP x year CSV
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "Zip_code")]
    zip_col: String,

    #[arg(long, default_value = "Year")]
    year_col: String,

    #[arg(long, default_value = "filing")]
    filing_col: String,

    #[arg(long, default_value = "evict")]
    evict_col: String,

    #[arg(long, default_value = "RenterOccupiedUnits")]
    households_col: String,

    #[arg(long, default_value_t = 2004)]
    min_year: i32,

    #[arg(long, default_value_t = 2016)]
    max_year: i32,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let years = YearRange::new(args.min_year, args.max_year);

    let table = read_csv(&args.input)?;
    let zip_idx = table.column(&args.zip_col)?;
    let year_idx = table.column(&args.year_col)?;
    let filing_idx = table.column(&args.filing_col)?;
    let evict_idx = table.column(&args.evict_col)?;
    let hh_idx = table.column(&args.households_col)?;
    info!("read {} raw rows from {}", table.rows.len(), args.input.display());

    let mut stats = ZipStats::default();
    let mut skipped_year = 0u64;
    let mut keyed = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let outcome = normalize_zip(table.field(row, zip_idx));
        stats.record(&outcome);
        let zip = match outcome.into_zip() {
            Some(z) => z,
            None => continue,
        };
        let year = match normalize_year(table.field(row, year_idx), years) {
            Some(y) => y,
            None => {
                skipped_year += 1;
                continue;
            }
        };
        // Counts default to 0 when unparseable; the denominator stays
        // absent so a missing household figure can never fake a rate.
        let filings = parse_num(table.field(row, filing_idx)).unwrap_or(0.0);
        let evictions = parse_num(table.field(row, evict_idx)).unwrap_or(0.0);
        let households = parse_num(table.field(row, hh_idx)).map_or(Value::Absent, Value::Num);
        keyed.push(KeyedRow {
            zip,
            year,
            values: vec![Value::Num(filings), Value::Num(evictions), households],
        });
    }
    stats.log_summary("zip column");
    if skipped_year > 0 {
        info!(
            "excluded {} rows with years outside {}..={}",
            skipped_year, years.min, years.max
        );
    }

    let aggregated = aggregate(keyed, &[Reducer::Sum, Reducer::Sum, Reducer::Mean]);
    if aggregated.is_empty() {
        return Err(PipelineError::DataQuality(
            "no rows survived normalization and year filtering".into(),
        )
        .into());
    }

    let headers: Vec<String> = [
        "zip",
        "year",
        "filings",
        "evict",
        "households",
        "filing_rate",
        "evict_rate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let rows: Vec<Vec<String>> = aggregated
        .iter()
        .map(|row| {
            let households = row.values[2].num();
            let filing_rate = rate(row.values[0].num(), households);
            let evict_rate = rate(row.values[1].num(), households);
            vec![
                row.zip.to_string(),
                row.year.to_string(),
                row.values[0].to_csv_field(),
                row.values[1].to_csv_field(),
                row.values[2].to_csv_field(),
                filing_rate.map_or(String::new(), |r| format!("{}", r)),
                evict_rate.map_or(String::new(), |r| format!("{}", r)),
            ]
        })
        .collect();

    write_csv(&args.out, &headers, &rows)?;
    info!("{} ZIP-year rows", rows.len());
    Ok(())
}

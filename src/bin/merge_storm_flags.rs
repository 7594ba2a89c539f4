//! Left-join storm treatment flags onto the ZIP×year table: one row per
//! ZIP-year in, one row out, with treated_hurr/treated_ts maxed over
//! storms and storm names concatenated unique-sorted.

use anyhow::Result;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use evmap::ident::{normalize_year, normalize_zip, YearRange, ZipStats};
use evmap::output::write_csv;
use evmap::table::{
    aggregate, canonicalize_headers, parse_num, read_csv, read_csv_sniffed, KeyedRow, Reducer,
    Value,
};

const FLAG_COLS: &[&str] = &["treated_hurr", "treated_ts", "storm_name"];

#[derive(Parser, Debug)]
#[command(name = "merge_storm_flags")]
#[command(about = "Merge storm treatment flags into the ZIP x year table")]
struct Args {
    /// Base ZIP x year CSV
    #[arg(long)]
    zip_year: PathBuf,

    /// Storm treatments CSV (zip, year, treated_hurr, treated_ts[, storm_name])
    #[arg(long)]
    storms: PathBuf,

    /// Output CSV
    #[arg(long)]
    out: PathBuf,

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

    // ── base table ──────────────────────────────────────────────────
    let base = read_csv(&args.zip_year)?;
    let zip_idx = base.column("zip")?;
    let year_idx = base.column("year")?;
    info!("base table: {} rows", base.rows.len());

    // ── storm flags ─────────────────────────────────────────────────
    // Exported storm tables vary: delimiter, header case, stray pandas
    // index columns. Sniff and scrub before resolving anything.
    let mut storms = read_csv_sniffed(&args.storms)?;
    canonicalize_headers(&mut storms);
    let s_zip_idx = storms.column("zip")?;
    let s_year_idx = storms.column("year")?;
    let s_hurr_idx = storms.column_opt("treated_hurr");
    let s_ts_idx = storms.column_opt("treated_ts");
    let s_name_idx = storms.column_opt("storm_name");
    info!(
        "storm table: {} rows (storm_name present: {})",
        storms.rows.len(),
        s_name_idx.is_some()
    );

    let mut storm_stats = ZipStats::default();
    let mut keyed = Vec::with_capacity(storms.rows.len());
    for row in &storms.rows {
        let outcome = normalize_zip(storms.field(row, s_zip_idx));
        storm_stats.record(&outcome);
        let zip = match outcome.into_zip() {
            Some(z) => z,
            None => continue,
        };
        let year = match normalize_year(storms.field(row, s_year_idx), years) {
            Some(y) => y,
            None => continue,
        };
        let flag = |idx: Option<usize>| {
            idx.and_then(|i| parse_num(storms.field(row, i)))
                .unwrap_or(0.0)
        };
        let name = s_name_idx
            .map(|i| storms.field(row, i).trim().to_string())
            .unwrap_or_default();
        keyed.push(KeyedRow {
            zip,
            year,
            values: vec![
                Value::Num(if flag(s_hurr_idx) != 0.0 { 1.0 } else { 0.0 }),
                Value::Num(if flag(s_ts_idx) != 0.0 { 1.0 } else { 0.0 }),
                Value::Text(name),
            ],
        });
    }
    storm_stats.log_summary("storm zip column");

    // One row per ZIP-year: a ZIP hit by two storms in one year keeps
    // flag=1 and both names.
    let collapsed = aggregate(
        keyed,
        &[Reducer::Max, Reducer::Max, Reducer::ConcatUniqueSorted],
    );
    let flags: HashMap<(String, i32), (f64, f64, String)> = collapsed
        .into_iter()
        .map(|row| {
            let hurr = row.values[0].num().unwrap_or(0.0);
            let ts = row.values[1].num().unwrap_or(0.0);
            let name = match &row.values[2] {
                Value::Text(s) => s.clone(),
                _ => String::new(),
            };
            ((row.zip.to_string(), row.year), (hurr, ts, name))
        })
        .collect();
    info!("{} distinct treated ZIP-years", flags.len());

    // ── left join, keep every base row ──────────────────────────────
    let kept_base: Vec<usize> = base
        .headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| (!FLAG_COLS.contains(&h.as_str())).then_some(i))
        .collect();
    let mut headers: Vec<String> = kept_base.iter().map(|&i| base.headers[i].clone()).collect();
    headers.extend(FLAG_COLS.iter().map(|s| s.to_string()));

    let mut base_stats = ZipStats::default();
    let mut any_hurr = 0u64;
    let mut any_ts = 0u64;
    let mut both = 0u64;
    let any_year = YearRange::new(0, 9999);
    let rows: Vec<Vec<String>> = base
        .rows
        .iter()
        .map(|row| {
            let outcome = normalize_zip(base.field(row, zip_idx));
            base_stats.record(&outcome);
            let zip = outcome.into_zip();
            let year = normalize_year(base.field(row, year_idx), any_year);

            let mut out: Vec<String> = kept_base
                .iter()
                .map(|&i| {
                    if i == zip_idx {
                        zip.as_ref().map(|z| z.to_string()).unwrap_or_default()
                    } else if i == year_idx {
                        year.map(|y| y.to_string()).unwrap_or_default()
                    } else {
                        base.field(row, i).to_string()
                    }
                })
                .collect();

            let (hurr, ts, name) = match (&zip, year) {
                (Some(z), Some(y)) => flags
                    .get(&(z.to_string(), y))
                    .cloned()
                    .unwrap_or((0.0, 0.0, String::new())),
                _ => (0.0, 0.0, String::new()),
            };
            if hurr == 1.0 {
                any_hurr += 1;
            }
            if ts == 1.0 {
                any_ts += 1;
            }
            if hurr == 1.0 && ts == 1.0 {
                both += 1;
            }
            out.push(format!("{}", hurr as i64));
            out.push(format!("{}", ts as i64));
            out.push(name);
            out
        })
        .collect();
    base_stats.log_summary("base zip column");

    write_csv(&args.out, &headers, &rows)?;
    info!(
        "ZIP-years treated: hurricane={}, tropical={}, both={}",
        any_hurr, any_ts, both
    );
    Ok(())
}

//! End-to-end run through the library exactly as the binaries drive it:
//! raw CSV → normalized keys → ZIP×year aggregation → polygon join →
//! GeoJSON on disk.

use std::fs;
use std::io::Write;

use serde_json::{Map, Value as Json};
use tempfile::tempdir;

use evmap::ident::{normalize_year, normalize_zip, YearRange};
use evmap::join::{join, JoinDirection};
use evmap::output::{feature, write_geojson};
use evmap::table::{aggregate, parse_num, rate, read_csv, KeyedRow, Reducer, Value};
use evmap::vector::{deduplicate_polygons, read_vector, PolygonRecord};

const RAW_CSV: &str = "\
Zip_code,Year,filing,evict,RenterOccupiedUnits
3216,2010,10,2,100
03216,2010,5,1,50
3216,2020,99,9,100
garbage,2010,7,0,10
33139,2010,4,0,
";

const ZCTA_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature",
     "properties": {"GEOID20": "03216"},
     "geometry": {"type": "Polygon",
                  "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
    {"type": "Feature",
     "properties": {"GEOID20": "3216"},
     "geometry": {"type": "Polygon",
                  "coordinates": [[[9,9],[10,9],[10,10],[9,10],[9,9]]]}}
  ]
}"#;

#[test]
fn raw_rows_become_one_joined_feature_per_zip_year() {
    let dir = tempdir().unwrap();
    let csv_path = dir.path().join("raw.csv");
    fs::File::create(&csv_path)
        .unwrap()
        .write_all(RAW_CSV.as_bytes())
        .unwrap();

    // prep_zip_year's path: normalize, filter, aggregate.
    let table = read_csv(&csv_path).unwrap();
    let zip_idx = table.column("Zip_code").unwrap();
    let year_idx = table.column("Year").unwrap();
    let filing_idx = table.column("filing").unwrap();
    let evict_idx = table.column("evict").unwrap();
    let hh_idx = table.column("RenterOccupiedUnits").unwrap();

    let years = YearRange::new(2004, 2016);
    let keyed: Vec<KeyedRow> = table
        .rows
        .iter()
        .filter_map(|row| {
            let zip = normalize_zip(table.field(row, zip_idx)).into_zip()?;
            let year = normalize_year(table.field(row, year_idx), years)?;
            Some(KeyedRow {
                zip,
                year,
                values: vec![
                    Value::Num(parse_num(table.field(row, filing_idx)).unwrap_or(0.0)),
                    Value::Num(parse_num(table.field(row, evict_idx)).unwrap_or(0.0)),
                    parse_num(table.field(row, hh_idx)).map_or(Value::Absent, Value::Num),
                ],
            })
        })
        .collect();
    // 2020 row excluded, garbage zip excluded: 3 rows remain.
    assert_eq!(keyed.len(), 3);

    let aggregated = aggregate(keyed, &[Reducer::Sum, Reducer::Sum, Reducer::Mean]);
    assert_eq!(aggregated.len(), 2);

    // "3216" and "03216" collapsed into one key.
    let merged = &aggregated[0];
    assert_eq!(merged.zip.as_str(), "03216");
    assert_eq!(merged.year, 2010);
    assert_eq!(merged.values[0], Value::Num(15.0));
    assert_eq!(merged.values[2], Value::Num(75.0));
    let filing_rate = rate(merged.values[0].num(), merged.values[2].num()).unwrap();
    assert!((filing_rate - 20.0).abs() < 1e-9);

    // 33139 has no households, so no rate.
    let other = &aggregated[1];
    assert_eq!(other.zip.as_str(), "33139");
    assert_eq!(rate(other.values[0].num(), other.values[2].num()), None);

    // build_geojson's path: polygons in, dedupe, keep-all-tabular join.
    let zcta_path = dir.path().join("zcta.geojson");
    fs::File::create(&zcta_path)
        .unwrap()
        .write_all(ZCTA_GEOJSON.as_bytes())
        .unwrap();
    let zcta = read_vector(&zcta_path).unwrap();
    assert_eq!(zcta.columns, vec!["GEOID20".to_string()]);

    let polygons: Vec<PolygonRecord> = zcta
        .features
        .iter()
        .filter_map(|f| {
            Some(PolygonRecord {
                zip: normalize_zip(&f.property_str("GEOID20")).into_zip()?,
                geometry: f.geometry.clone(),
            })
        })
        .collect();
    // Both raw polygons canonicalize to 03216; dedupe keeps the first.
    assert_eq!(polygons.len(), 2);
    let polygons = deduplicate_polygons(polygons);
    assert_eq!(polygons.len(), 1);

    let tabular_count = aggregated.len();
    let joined = join(aggregated, &polygons, JoinDirection::KeepAllTabular);
    assert_eq!(joined.len(), tabular_count);
    assert!(joined[0].geometry.is_some());
    assert!(joined[1].geometry.is_none(), "33139 has no polygon");

    // Write only the mappable rows, read them back through the reader.
    let out_path = dir.path().join("data").join("joined.geojson");
    let features = joined
        .into_iter()
        .filter_map(|record| {
            let geometry = record.geometry?;
            let mut properties = Map::new();
            properties.insert("zip".into(), Json::String(record.zip.to_string()));
            properties.insert("year".into(), Json::from(record.year.unwrap()));
            Some(feature(properties, &geometry))
        })
        .collect();
    write_geojson(&out_path, features).unwrap();

    let round_trip = read_vector(&out_path).unwrap();
    assert_eq!(round_trip.features.len(), 1);
    assert_eq!(round_trip.features[0].property_str("zip"), "03216");
    assert_eq!(round_trip.features[0].property_num("year"), Some(2010.0));
}

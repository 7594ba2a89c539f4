//! Data preparation for the eviction web map: canonicalize ZIP/ZCTA
//! identifiers, aggregate eviction records to ZIP×year, join them onto
//! ZCTA polygons, and emit web-ready GeoJSON.
//!
//! Every binary in `src/bin/` is an independent batch tool: read flat
//! files, normalize keys, one join or group-by, write the output
//! atomically. All shared logic lives here.

pub mod cones;
pub mod error;
pub mod ident;
pub mod join;
pub mod output;
pub mod table;
pub mod vector;

pub use error::PipelineError;

//! Command line region lookup.
//!
//! Resolves coordinates given as arguments or read from a CSV file and prints one
//! JSON object per coordinate.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use quyu::config::Config;
use quyu::models::Location;
use quyu::pip::{BoundaryLoader, RegionResolver};
use quyu::source::open_source;
use quyu::parse_dms;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "quyu-locate")]
#[command(about = "Resolve coordinates to province / city / district")]
struct Args {
    /// Coordinates as `lon,lat`, decimal or DMS (e.g. `121°32′E,31°13′N`)
    coords: Vec<String>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Boundary CSV (overrides config)
    #[arg(short, long)]
    boundaries: Option<PathBuf>,

    /// CSV file with `lon,lat` header columns
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Coordinates resolved per parallel batch
    #[arg(long, default_value = "10000")]
    batch_size: usize,

    /// Print only coordinates that resolved to a region
    #[arg(long)]
    found_only: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct CoordRow {
    #[serde(alias = "lng", alias = "longitude")]
    lon: String,
    #[serde(alias = "latitude")]
    lat: String,
}

#[derive(Serialize)]
struct LocateOutput<'a> {
    lon: f64,
    lat: f64,
    #[serde(flatten)]
    location: &'a Location,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(path) = &args.boundaries {
        config.boundaries.path = path.clone();
    }

    let mut coords = Vec::new();
    for raw in &args.coords {
        let pair = parse_pair(raw).with_context(|| format!("Invalid coordinate {raw:?}"))?;
        coords.push(pair);
    }
    if let Some(input) = &args.input {
        let skipped = read_coords(input, &mut coords)?;
        info!("Read {} coordinates ({} skipped) from {}", coords.len(), skipped, input.display());
    }
    if coords.is_empty() {
        anyhow::bail!("No coordinates given; pass `lon,lat` arguments or --input");
    }

    let loader = BoundaryLoader::new(config.boundaries.path.clone());
    let store = loader
        .load()
        .with_context(|| format!("Failed to load boundaries from {}", loader.path().display()))?;
    let resolver = RegionResolver::from_store(store);

    let pb = if args.input.is_some() {
        let pb = ProgressBar::new(coords.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut found = 0usize;

    for chunk in coords.chunks(args.batch_size.max(1)) {
        let locations = resolver.resolve_batch(chunk);

        for (&(lon, lat), location) in chunk.iter().zip(&locations) {
            if location.is_found() {
                found += 1;
            } else if args.found_only {
                continue;
            }
            serde_json::to_writer(&mut out, &LocateOutput { lon, lat, location })?;
            out.write_all(b"\n")?;
        }

        pb.inc(chunk.len() as u64);
    }

    out.flush()?;
    pb.finish_and_clear();

    info!("Resolved {}/{} coordinates", found, coords.len());
    Ok(())
}

/// Read `lon,lat` rows, returning the number of rows skipped
fn read_coords(path: &std::path::Path, coords: &mut Vec<(f64, f64)>) -> Result<usize> {
    let reader = open_source(path)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut skipped = 0;
    for (row, result) in csv_reader.deserialize::<CoordRow>().enumerate() {
        let parsed = result
            .map_err(anyhow::Error::from)
            .and_then(|r| parse_coordinate(&r.lon).zip(parse_coordinate(&r.lat)).context("bad number"));

        match parsed {
            Ok(pair) => coords.push(pair),
            Err(e) => {
                warn!("Skipping input row {}: {}", row + 1, e);
                skipped += 1;
            }
        }
    }

    Ok(skipped)
}

/// Decimal degrees, falling back to DMS notation
fn parse_coordinate(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().or_else(|| parse_dms(value))
}

fn parse_pair(raw: &str) -> Result<(f64, f64)> {
    let (lon, lat) = raw
        .split_once(',')
        .context("expected `lon,lat`")?;
    let lon = parse_coordinate(lon).context("bad longitude")?;
    let lat = parse_coordinate(lat).context("bad latitude")?;
    Ok((lon, lat))
}

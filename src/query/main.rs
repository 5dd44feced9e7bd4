//! Query server for region lookups and range searches.
//!
//! Provides an HTTP API for resolving coordinates to administrative regions and for
//! circular range queries over track records.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use geo::Point;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use quyu::config::{Config, RangeConfig, TrackConfig};
use quyu::models::{parse_timestamp, Location, RangeHit, RegionLevel, RegionSummary, TrackFilter, TrackPoint, TrackStats};
use quyu::pip::{BoundaryLoader, RegionResolver, StoreStats};
use quyu::{Error, InMemoryTrackSource, LoadReport, RangeEngine, RangeOptions};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "quyu-server")]
#[command(about = "Region lookup and range query server")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Boundary CSV (overrides config)
    #[arg(long)]
    boundaries: Option<PathBuf>,

    /// Track records CSV (overrides config)
    #[arg(long)]
    tracks: Option<PathBuf>,
}

/// Application state shared across handlers
struct AppState {
    resolver: RegionResolver,
    boundary_report: LoadReport,
    range: Option<RangeEngine<InMemoryTrackSource>>,
    /// Computed once at startup; the track source never changes
    track_stats: Option<TrackStats>,
    limits: RangeConfig,
    timeout: Duration,
}

impl AppState {
    fn new(
        resolver: RegionResolver,
        boundary_report: LoadReport,
        range: Option<RangeEngine<InMemoryTrackSource>>,
        config: &Config,
    ) -> quyu::Result<Self> {
        let track_stats = range.as_ref().map(|r| r.stats()).transpose()?;

        Ok(Self {
            resolver,
            boundary_report,
            range,
            track_stats,
            limits: config.range.clone(),
            timeout: config.server.query_timeout(),
        })
    }
}

/// Parent id carried by top-level regions
const ROOT_PARENT_ID: i64 = 0;

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(path) = args.boundaries {
        config.boundaries.path = path;
    }
    if let Some(path) = args.tracks {
        config.tracks = Some(TrackConfig { path });
    }

    info!("Quyu Query Server");

    let loader = BoundaryLoader::new(config.boundaries.path.clone());
    let store = loader
        .load()
        .with_context(|| format!("Failed to load boundaries from {}", loader.path().display()))?;
    let boundary_report = loader.report().unwrap_or_default();
    let resolver = RegionResolver::from_store(store);

    let range = match &config.tracks {
        Some(tracks) => {
            let (source, _) = InMemoryTrackSource::load_csv(&tracks.path)
                .with_context(|| format!("Failed to load tracks from {}", tracks.path.display()))?;
            Some(RangeEngine::new(source).with_candidate_factor(config.range.candidate_factor))
        }
        None => {
            warn!("No track source configured, range endpoints are disabled");
            None
        }
    };

    let state = Arc::new(
        AppState::new(resolver, boundary_report, range, &config)
            .context("Failed to summarize track source")?,
    );

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/resolve", get(resolve_handler))
        .route("/v1/regions/contains", get(contains_handler))
        .route("/v1/regions/nearby", get(nearby_handler))
        .route("/v1/regions/search", get(search_handler))
        .route("/v1/regions/{id}/children", get(children_handler))
        .route("/v1/range", get(range_handler))
        .route("/v1/range/count", get(count_handler))
        .route("/v1/tracks/{owner}", get(track_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", config.server.listen);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run a query on the blocking pool, bounded by the configured timeout
async fn run_query<T, F>(state: &Arc<AppState>, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> quyu::Result<T> + Send + 'static,
{
    let shared = Arc::clone(state);
    let task = tokio::task::spawn_blocking(move || query(&shared));

    match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(result)) => result.map_err(query_error),
        Ok(Err(e)) => {
            tracing::error!("Query task failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(_) => {
            warn!("Query timed out after {:?}", state.timeout);
            Err((StatusCode::GATEWAY_TIMEOUT, "query timed out".to_string()))
        }
    }
}

fn query_error(e: Error) -> ApiError {
    match e {
        Error::InvalidQuery(msg) => (StatusCode::BAD_REQUEST, msg),
        other => {
            tracing::error!("Query execution failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn parse_time(value: &Option<String>, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("invalid {name}: {raw:?}"))),
    }
}

fn require_range(state: &AppState) -> Result<(), ApiError> {
    if state.range.is_none() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "no track source configured".to_string(),
        ));
    }
    Ok(())
}

/// Reference to the range engine inside a blocking query
fn engine(state: &AppState) -> quyu::Result<&RangeEngine<InMemoryTrackSource>> {
    state
        .range
        .as_ref()
        .ok_or_else(|| Error::InvalidQuery("no track source configured".to_string()))
}

fn clamp_limit(limits: &RangeConfig, requested: Option<usize>) -> usize {
    requested.unwrap_or(limits.default_limit).min(limits.max_limit)
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        regions: state.resolver.store().stats(),
        boundaries: state.boundary_report,
        tracks: state.track_stats.clone(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    regions: StoreStats,
    boundaries: LoadReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    tracks: Option<TrackStats>,
}

#[derive(Deserialize)]
struct PointParams {
    lon: f64,
    lat: f64,
}

#[derive(Serialize)]
struct ResolveResponse {
    lon: f64,
    lat: f64,
    found: bool,
    #[serde(flatten)]
    location: Location,
}

/// Resolve a coordinate to its finest containing region
async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointParams>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let PointParams { lon, lat } = params;
    let location = run_query(&state, move |s| Ok(s.resolver.resolve(lon, lat))).await?;

    Ok(Json(ResolveResponse {
        lon,
        lat,
        found: location.is_found(),
        location,
    }))
}

/// Every region containing the point, province first
async fn contains_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointParams>,
) -> Result<Json<Vec<RegionSummary>>, ApiError> {
    let PointParams { lon, lat } = params;
    let regions = run_query(&state, move |s| {
        Ok(s.resolver
            .containing(lon, lat)
            .into_iter()
            .map(|r| r.summary())
            .collect())
    })
    .await?;

    Ok(Json(regions))
}

#[derive(Deserialize)]
struct NearbyParams {
    lon: f64,
    lat: f64,
    /// Level name or depth, defaults to district
    level: Option<String>,
    size: Option<usize>,
}

#[derive(Serialize)]
struct NearbyResponse {
    #[serde(flatten)]
    region: RegionSummary,
    distance_m: f64,
}

/// Regions of one level ranked by distance from their center
async fn nearby_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<NearbyResponse>>, ApiError> {
    let level = match &params.level {
        Some(raw) => raw
            .parse::<RegionLevel>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => RegionLevel::District,
    };
    let size = params.size.unwrap_or(10).min(100);
    let NearbyParams { lon, lat, .. } = params;

    let nearby = run_query(&state, move |s| {
        Ok(s.resolver
            .nearby(lon, lat, level, size)
            .into_iter()
            .map(|n| NearbyResponse {
                region: n.region.summary(),
                distance_m: n.distance_m,
            })
            .collect())
    })
    .await?;

    Ok(Json(nearby))
}

#[derive(Deserialize)]
struct SearchParams {
    name: String,
}

/// Regions whose name contains the fragment
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<RegionSummary>>, ApiError> {
    let regions = run_query(&state, move |s| {
        Ok(s.resolver
            .find_by_name(&params.name)
            .into_iter()
            .map(|r| r.summary())
            .collect())
    })
    .await?;

    Ok(Json(regions))
}

/// Children of `id`, or `None` for an unknown region. Id 0 lists the provinces.
fn region_children(resolver: &RegionResolver, id: i64) -> Option<Vec<RegionSummary>> {
    if id != ROOT_PARENT_ID && resolver.store().region_by_id(id).is_none() {
        return None;
    }

    Some(
        resolver
            .children_of(id)
            .into_iter()
            .map(|r| r.summary())
            .collect(),
    )
}

/// Direct children of a region
async fn children_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RegionSummary>>, ApiError> {
    match run_query(&state, move |s| Ok(region_children(&s.resolver, id))).await? {
        Some(children) => Ok(Json(children)),
        None => Err((StatusCode::NOT_FOUND, format!("region {id} not found"))),
    }
}

#[derive(Deserialize)]
struct RangeParams {
    lon: f64,
    lat: f64,
    /// Radius in meters
    radius: f64,
    start_time: Option<String>,
    end_time: Option<String>,
    owner: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RangeResponse {
    count: usize,
    hits: Vec<RangeHit>,
}

/// Records within a radius of a point, nearest first
async fn range_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<RangeResponse>, ApiError> {
    require_range(&state)?;

    let options = RangeOptions {
        filter: TrackFilter {
            start_time: parse_time(&params.start_time, "start_time")?,
            end_time: parse_time(&params.end_time, "end_time")?,
            owner_id: params.owner,
        },
        limit: clamp_limit(&state.limits, params.limit),
    };
    let center = Point::new(params.lon, params.lat);
    let radius = params.radius;

    let hits = run_query(&state, move |s| engine(s)?.range_query(center, radius, &options)).await?;

    Ok(Json(RangeResponse {
        count: hits.len(),
        hits,
    }))
}

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

/// Upper bound on the records within a radius (bounding box count)
async fn count_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<CountResponse>, ApiError> {
    require_range(&state)?;

    let start = parse_time(&params.start_time, "start_time")?;
    let end = parse_time(&params.end_time, "end_time")?;
    let center = Point::new(params.lon, params.lat);
    let radius = params.radius;

    let count = run_query(&state, move |s| engine(s)?.count_in_range(center, radius, start, end)).await?;

    Ok(Json(CountResponse { count }))
}

#[derive(Deserialize)]
struct TrackParams {
    start_time: Option<String>,
    end_time: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct TrackResponse {
    owner_id: String,
    points: Vec<TrackPoint>,
}

/// One owner's trajectory ordered by time
async fn track_handler(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Query(params): Query<TrackParams>,
) -> Result<Json<TrackResponse>, ApiError> {
    require_range(&state)?;

    let start = parse_time(&params.start_time, "start_time")?;
    let end = parse_time(&params.end_time, "end_time")?;
    let limit = clamp_limit(&state.limits, params.limit);

    let owner_id = owner.clone();
    let points = run_query(&state, move |s| engine(s)?.track_of(&owner_id, start, end, limit)).await?;

    if points.is_empty() {
        return Err((StatusCode::NOT_FOUND, format!("no track points for {owner}")));
    }

    Ok(Json(TrackResponse {
        owner_id: owner,
        points,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quyu::models::{GeoPoint, Region};
    use quyu::pip::BoundaryStore;

    fn region(id: i64, parent_id: i64, level: RegionLevel, name: &str, path: &str) -> Region {
        Region {
            id,
            parent_id,
            level,
            name: name.to_string(),
            full_path: path.to_string(),
            center: None,
            bbox: None,
            rings: Vec::new(),
        }
    }

    fn resolver() -> RegionResolver {
        RegionResolver::from_store(Arc::new(BoundaryStore::build(vec![
            region(31, 0, RegionLevel::Province, "上海市", "上海市"),
            region(11, 0, RegionLevel::Province, "北京市", "北京市"),
            region(3101, 31, RegionLevel::City, "上海市", "上海市 上海市"),
        ])))
    }

    #[test]
    fn test_root_id_lists_provinces() {
        let resolver = resolver();
        let ids: Vec<i64> = region_children(&resolver, ROOT_PARENT_ID)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![31, 11]);
    }

    #[test]
    fn test_children_of_known_and_unknown_regions() {
        let resolver = resolver();
        let ids: Vec<i64> = region_children(&resolver, 31).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3101]);
        assert!(region_children(&resolver, 3101).unwrap().is_empty());
        assert!(region_children(&resolver, 99).is_none());
    }

    #[tokio::test]
    async fn test_health_reports_cached_track_stats() {
        let recorded_at = Utc::now();
        let source = InMemoryTrackSource::new(vec![TrackPoint {
            id: 1,
            owner_id: "V0001".to_string(),
            position: GeoPoint { lon: 121.5, lat: 31.2 },
            speed: None,
            bearing: None,
            recorded_at,
        }]);
        let state = AppState::new(
            resolver(),
            LoadReport { loaded: 3, skipped: 0 },
            Some(RangeEngine::new(source)),
            &Config::default(),
        )
        .unwrap();

        let expected = state.track_stats.clone();
        assert_eq!(expected.as_ref().map(|s| s.point_count), Some(1));

        let Json(health) = health_handler(State(Arc::new(state))).await;
        assert_eq!(health.tracks, expected);
        assert_eq!(health.regions.provinces, 2);
    }
}

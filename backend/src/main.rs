#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), forbid(clippy::expect_used))]
//! Gateway entry-point: wires the library's components into an actix
//! process and exposes liveness, comprehensive health, and metrics
//! endpoints. The authenticated proxy surface that actually forwards
//! requests to the workload backend is the external router's job, not
//! this binary's.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App, HttpResponse, HttpServer};
#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetricsBuilder;
use tracing::warn;

use backend::backend_client::{BackendClient, BackendClientConfig};
use backend::cache::CacheHierarchy;
use backend::config::{CacheConfig, GraphConfig, HealthConfig, PollerConfig};
use backend::graph::{GraphService, TemporalStore};
use backend::health::{
    CacheHierarchyProbe, ConnectionPoolsProbe, CpuProbe, FileSystemProbe, HealthOrchestrator,
    HealthProbe, MemoryProbe, TwsMonitorProbe, UnwiredProbe, DATABASE, REDIS, WEBSOCKET_POOL,
};
use backend::metrics::Metrics;
use backend::observability::{health_handler, init_tracing, metrics_handler};
use backend::poller::Poller;

/// Liveness flag: flips once every component has been constructed and the
/// poller is running. Distinct from `/health`, which runs a fresh
/// comprehensive check on every call.
#[derive(Default)]
struct Liveness(AtomicBool);

impl Liveness {
    fn mark_live(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

async fn healthz(liveness: web::Data<Arc<Liveness>>) -> HttpResponse {
    if liveness.is_live() {
        HttpResponse::Ok().finish()
    } else {
        HttpResponse::ServiceUnavailable().finish()
    }
}

/// Everything the bootstrap builds once and shares across workers.
struct AppState {
    liveness: web::Data<Arc<Liveness>>,
    metrics: web::Data<Arc<Metrics>>,
    orchestrator: web::Data<Arc<HealthOrchestrator>>,
    cache: web::Data<Arc<CacheHierarchy>>,
    graph: web::Data<Arc<GraphService>>,
}

fn build_app(
    state: &AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(state.liveness.clone())
        .app_data(state.metrics.clone())
        .app_data(state.orchestrator.clone())
        .app_data(state.cache.clone())
        .app_data(state.graph.clone())
        .route("/healthz", web::get().to(healthz))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler))
}

fn bind_address() -> (String, u16) {
    (
        env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        match env::var("PORT") {
            Ok(p) => match p.parse::<u16>() {
                Ok(n) => n,
                Err(_) => {
                    warn!(value = %p, "invalid PORT; falling back to 8080");
                    8080u16
                }
            },
            Err(_) => 8080u16,
        },
    )
}

fn watched_path() -> PathBuf {
    PathBuf::from(env::var("HEALTH_WATCHED_PATH").unwrap_or_else(|_| "/".to_string()))
}

fn build_orchestrator(
    client: Arc<BackendClient>,
    cache: Arc<CacheHierarchy>,
    config: HealthConfig,
    metrics: Arc<Metrics>,
) -> HealthOrchestrator {
    let probes: Vec<Arc<dyn HealthProbe>> = vec![
        Arc::new(UnwiredProbe::new(DATABASE)),
        Arc::new(UnwiredProbe::new(REDIS)),
        Arc::new(CacheHierarchyProbe::new(Arc::clone(&cache))),
        Arc::new(FileSystemProbe::new(config, watched_path())),
        Arc::new(MemoryProbe::new(config)),
        Arc::new(CpuProbe::new(config)),
        Arc::new(TwsMonitorProbe::new(Arc::clone(&client))),
        Arc::new(ConnectionPoolsProbe::new(client, config)),
        Arc::new(UnwiredProbe::new(WEBSOCKET_POOL)),
    ];
    HealthOrchestrator::new(probes, config, metrics)
}

#[cfg(feature = "metrics")]
fn make_prometheus_exporter() -> Option<actix_web_prom::PrometheusMetrics> {
    // A separate Prometheus registry from `Metrics`' own — this only adds
    // actix-web-prom's standard HTTP request/latency instrumentation as
    // middleware; `Metrics::export_json` remains the one place this
    // core's own counters/gauges/histograms are read from.
    match PrometheusMetricsBuilder::new("tws_gateway")
        .endpoint("/metrics/prometheus")
        .build()
    {
        Ok(exporter) => Some(exporter),
        Err(error) => {
            warn!(
                error = %error,
                "failed to initialize Prometheus scrape endpoint; continuing with JSON-only metrics"
            );
            None
        }
    }
}

// `HttpServer::run` erases the worker factory's service type into a plain
// `Server` handle, so the two branches below can build genuinely different
// App types (wrapped vs. not) without a boxed-service adapter in between.
#[cfg(feature = "metrics")]
fn create_server(
    state: AppState,
    prometheus: Option<actix_web_prom::PrometheusMetrics>,
) -> std::io::Result<Server> {
    let server = match prometheus {
        Some(exporter) => HttpServer::new(move || build_app(&state).wrap(exporter.clone()))
            .bind(bind_address())?
            .run(),
        None => HttpServer::new(move || build_app(&state)).bind(bind_address())?.run(),
    };
    Ok(server)
}

#[cfg(not(feature = "metrics"))]
fn create_server(state: AppState) -> std::io::Result<Server> {
    let server = HttpServer::new(move || build_app(&state))
        .bind(bind_address())?
        .run();
    Ok(server)
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(error) = init_tracing() {
        warn!(error = %error, "tracing init failed");
    }

    let metrics = Arc::new(Metrics::new());
    let backend_config = BackendClientConfig::from_env();
    let client = Arc::new(
        BackendClient::new(&backend_config, Arc::clone(&metrics)).map_err(std::io::Error::other)?,
    );
    let cache =
        Arc::new(CacheHierarchy::new(CacheConfig::from_env()).map_err(std::io::Error::other)?);
    let graph = Arc::new(GraphService::new(Arc::clone(&client), GraphConfig::from_env()));
    let temporal = Arc::new(TemporalStore::new(Arc::clone(&metrics)));

    let health_config = HealthConfig::from_env();
    let orchestrator = Arc::new(build_orchestrator(
        Arc::clone(&client),
        Arc::clone(&cache),
        health_config,
        Arc::clone(&metrics),
    ));

    let poller = Arc::new(Poller::new(
        Arc::clone(&client),
        Arc::clone(&metrics),
        temporal,
        PollerConfig::from_env(),
    ));
    tokio::spawn(Arc::clone(&poller).run_forever());

    let liveness = Arc::new(Liveness::default());
    liveness.mark_live();

    let state = AppState {
        liveness: web::Data::new(liveness),
        metrics: web::Data::new(Arc::clone(&metrics)),
        orchestrator: web::Data::new(orchestrator),
        cache: web::Data::new(cache),
        graph: web::Data::new(graph),
    };

    #[cfg(feature = "metrics")]
    let prometheus = make_prometheus_exporter();
    #[cfg(feature = "metrics")]
    let server = create_server(state, prometheus)?;
    #[cfg(not(feature = "metrics"))]
    let server = create_server(state)?;

    server.await
}

pub mod auth;
pub mod error;
pub mod handlers;
pub mod ical;
pub mod models;
pub mod openapi;
pub mod repository;
pub mod service;
pub mod settings;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use handlers::{
    create_activity, get_activity, get_ical, healthz_live, healthz_ready, list_activities,
    remove_activity, reserve_turn, root, update_activity,
};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::ical::ICalExporter;
use crate::models::Activity;
use crate::openapi::ApiDoc;
use crate::repository::InMemoryActivityRepository;
use crate::service::BookingService;
use crate::settings::Settings;
use crate::validation::SchemaValidator;

#[derive(Clone)]
pub struct AppState {
    pub(crate) settings: Settings,
    pub(crate) service: Arc<BookingService>,
    pub(crate) exporter: Arc<ICalExporter>,
}

impl AppState {
    pub fn new(settings: Settings, service: Arc<BookingService>) -> Self {
        Self {
            settings,
            service,
            exporter: Arc::new(ICalExporter::new()),
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let service = Arc::new(BookingService::new(
        Arc::new(InMemoryActivityRepository::new()),
        Arc::new(SchemaValidator),
        settings.reserve_attempts,
    ));
    if let Some(path) = &settings.seed_file {
        let count = seed(&service, path)?;
        info!("Loaded {count} activities from {path}");
    }

    let state = AppState::new(settings.clone(), service);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!("Starting Bookle API on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Creates every activity of a JSON array file through the service, so each
/// one is validated and gets a repository-assigned identifier.
pub fn seed(service: &BookingService, path: &str) -> Result<usize, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let activities: Vec<Activity> = serde_json::from_str(&raw)?;
    let count = activities.len();
    for activity in activities {
        service.create(activity)?;
    }
    Ok(count)
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/activities", get(list_activities).post(create_activity))
        .route(
            "/activities/{id}",
            get(get_activity)
                .put(update_activity)
                .delete(remove_activity),
        )
        .route("/activities/{id}/reservations", post(reserve_turn))
        .route("/activities/{id}/agenda.ical", get(get_ical))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}

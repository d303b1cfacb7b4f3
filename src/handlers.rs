use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::{
    AppState,
    auth::{AdminOperation, verify_token},
    error::ApiError,
    models::{
        Activity, CreatedActivity, ReservationOutcome, ReservationRequest, SummaryListing,
    },
};

#[derive(Debug, serde::Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

fn authorize(
    state: &AppState,
    operation: AdminOperation,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    query: &TokenQuery,
) -> Result<(), ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, operation, auth_header, query.token.as_deref())
}

#[utoipa::path(get, path = "/", tag = "activities")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Bookle activity booking API",
        "endpoints": {
            "/activities": "List activity summaries or create an activity",
            "/activities/{id}": "Read, replace or remove an activity",
            "/activities/{id}/reservations": "Reserve a turn on an agenda day",
            "/activities/{id}/agenda.ical": "Download the agenda as iCal file"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "activities")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/healthz/ready", tag = "activities")]
pub async fn healthz_ready() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/activities",
    responses(
        (status = 200, description = "Summaries of all activities", body = SummaryListing)
    ),
    tag = "activities"
)]
pub async fn list_activities(
    State(state): State<AppState>,
) -> Result<Json<SummaryListing>, ApiError> {
    Ok(Json(state.service.list_summaries()?))
}

#[utoipa::path(
    post,
    path = "/activities",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    request_body = Activity,
    responses(
        (status = 201, description = "Activity created", body = CreatedActivity),
        (status = 400, description = "Activity does not conform to the schema"),
        (status = 401, description = "Invalid authentication token")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "activities"
)]
pub async fn create_activity(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
    Json(activity): Json<Activity>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, AdminOperation::Create, auth, &query)?;

    let id = state.service.create(activity)?;
    Ok((StatusCode::CREATED, Json(CreatedActivity { id })))
}

#[utoipa::path(
    get,
    path = "/activities/{id}",
    params(("id" = String, Path, description = "Activity identifier")),
    responses(
        (status = 200, description = "The activity", body = Activity),
        (status = 404, description = "Activity not found")
    ),
    tag = "activities"
)]
pub async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    Ok(Json(state.service.get_activity(&id)?))
}

#[utoipa::path(
    put,
    path = "/activities/{id}",
    params(
        ("id" = String, Path, description = "Activity identifier"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    request_body = Activity,
    responses(
        (status = 204, description = "Activity replaced"),
        (status = 400, description = "Activity does not conform to the schema"),
        (status = 401, description = "Invalid authentication token"),
        (status = 404, description = "Activity not found"),
        (status = 409, description = "Activity version is stale")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "activities"
)]
pub async fn update_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
    Json(mut activity): Json<Activity>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, AdminOperation::Update, auth, &query)?;

    activity.id = id;
    state.service.update(&activity)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/activities/{id}",
    params(
        ("id" = String, Path, description = "Activity identifier"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 204, description = "Activity removed"),
        (status = 401, description = "Invalid authentication token"),
        (status = 404, description = "Activity not found")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "activities"
)]
pub async fn remove_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, AdminOperation::Remove, auth, &query)?;

    state.service.remove_activity(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/activities/{id}/reservations",
    params(("id" = String, Path, description = "Activity identifier")),
    request_body = ReservationRequest,
    responses(
        (status = 200, description = "`reserved` is false when the turn was already taken", body = ReservationOutcome),
        (status = 400, description = "Missing date, bad turn index, blank student or date not on the agenda"),
        (status = 404, description = "Activity not found"),
        (status = 409, description = "Activity kept changing while reserving")
    ),
    tag = "activities"
)]
pub async fn reserve_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ReservationRequest>,
) -> Result<Json<ReservationOutcome>, ApiError> {
    let reserved = state.service.reserve(&id, &request)?;
    Ok(Json(ReservationOutcome { reserved }))
}

#[utoipa::path(
    get,
    path = "/activities/{id}/agenda.ical",
    params(("id" = String, Path, description = "Activity identifier")),
    responses(
        (status = 200, description = "iCal file", content_type = "text/calendar"),
        (status = 404, description = "Activity not found or agenda empty")
    ),
    tag = "activities"
)]
pub async fn get_ical(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let activity = state.service.get_activity(&id)?;
    if activity.agenda.is_empty() {
        return Err(ApiError::NotFound("activity has no agenda days".into()));
    }

    let body = state.exporter.generate(&activity);
    Ok((
        StatusCode::OK,
        [
            ("content-type", "text/calendar"),
            ("content-disposition", "attachment; filename=agenda.ics"),
        ],
        body,
    ))
}

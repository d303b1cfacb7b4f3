use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::models::{
    Activity, ActivitySummary, AgendaDay, CreatedActivity, Reservation, ReservationOutcome,
    ReservationRequest, SkippedActivity, SummaryListing, Turn,
};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "query_token",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::new("token"))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::list_activities,
        crate::handlers::create_activity,
        crate::handlers::get_activity,
        crate::handlers::update_activity,
        crate::handlers::remove_activity,
        crate::handlers::reserve_turn,
        crate::handlers::get_ical
    ),
    components(schemas(
        Activity,
        AgendaDay,
        Turn,
        Reservation,
        ActivitySummary,
        SkippedActivity,
        SummaryListing,
        ReservationRequest,
        ReservationOutcome,
        CreatedActivity
    )),
    tags(
        (name = "activities", description = "Activity agendas and turn reservations")
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

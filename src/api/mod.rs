use axum::{extract::State, Json, Router};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::{openapi::OpenApi, OpenApi as OpenApiTrait, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{util::errors::RouteError, AppState};

mod auth;
mod leaderboard;
mod matches;
mod participation;
mod players;
mod stadiums;

#[derive(OpenApiTrait)]
#[openapi(servers((url = "/api")), security(
    (),
    ("token_jwt" = [])
))]
pub struct ApiDoc;

pub fn routes() -> (Router<AppState>, OpenApi) {
    OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(health_check))
        .nest("/auth", auth::routes())
        .nest("/players", players::routes())
        .nest("/stadiums", stadiums::routes())
        .nest("/matches", matches::routes())
        .nest("/participation", participation::routes())
        .merge(leaderboard::routes())
        .split_for_parts()
}

/// Outcome text for the notification layer, optionally with a warning tone
/// for idempotent no-ops.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub warning: bool,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
            warning: false,
        })
    }

    pub fn warning(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
            warning: true,
        })
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct HealthCheck {
    status: &'static str,
    upcoming_matches: i64,
}

/// Get health of the API.
#[utoipa::path(
    method(get),
    path = "/healthCheck",
    responses(
        (status = OK, description = "Success", body = HealthCheck, content_type = "application/json")
    )
)]
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthCheck>, RouteError> {
    use crate::schema::matches;

    let mut conn = state.db.get().await?;
    let upcoming_matches: i64 = matches::table
        .filter(matches::date.ge(OffsetDateTime::now_utc().date()))
        .count()
        .get_result(&mut conn)
        .await?;

    Ok(Json(HealthCheck {
        status: "ok",
        upcoming_matches,
    }))
}

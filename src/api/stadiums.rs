use axum::{
    extract::{Path, State},
    Json,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use validator::Validate;

use crate::{
    api::MessageResponse,
    models::stadiums::{NewStadium, Stadium},
    util::{
        errors::{RouteError, SimpleRouteErrorOutput},
        jwt::Claims,
    },
    AppState,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_stadiums, create_stadium))
        .routes(routes!(update_stadium, delete_stadium))
}

/// List stadiums
#[utoipa::path(
    method(get),
    path = "",
    responses(
        (status = OK, description = "Success", body = Vec<Stadium>, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn list_stadiums(State(state): State<AppState>) -> Result<Json<Vec<Stadium>>, RouteError> {
    let mut conn = state.db.get().await?;
    Ok(Json(Stadium::all(&mut conn).await?))
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
struct StadiumRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    /// Embeddable maps URL, stored as-is.
    maps_embed_url: Option<String>,
}

/// Create a stadium (admin)
#[utoipa::path(
    method(post),
    path = "",
    request_body = StadiumRequest,
    responses(
        (status = OK, description = "Success", body = Stadium, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Invalid parameters", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn create_stadium(
    State(state): State<AppState>,
    claims: Claims,
    Json(payload): Json<StadiumRequest>,
) -> Result<Json<Stadium>, RouteError> {
    claims.require_admin()?;
    payload.validate().map_err(|e| {
        let message = format!("Stadium validation error: [{e}]").replace('\n', ", ");
        RouteError::new_bad_request().set_public_error_message(&message)
    })?;

    let mut conn = state.db.get().await?;
    let stadium = NewStadium {
        name: &payload.name,
        maps_embed_url: payload.maps_embed_url.as_deref(),
    }
    .create(&mut conn)
    .await?;

    Ok(Json(stadium))
}

/// Update a stadium (admin)
#[utoipa::path(
    method(patch),
    path = "/{id}",
    request_body = StadiumRequest,
    responses(
        (status = OK, description = "Success", body = Stadium, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such stadium", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn update_stadium(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<StadiumRequest>,
) -> Result<Json<Stadium>, RouteError> {
    use crate::schema::stadiums;

    claims.require_admin()?;
    payload.validate().map_err(|e| {
        let message = format!("Stadium validation error: [{e}]").replace('\n', ", ");
        RouteError::new_bad_request().set_public_error_message(&message)
    })?;

    let mut conn = state.db.get().await?;
    let stadium = diesel::update(stadiums::table.find(id))
        .set((
            stadiums::name.eq(&payload.name),
            stadiums::maps_embed_url.eq(payload.maps_embed_url.as_deref()),
        ))
        .get_result::<Stadium>(&mut conn)
        .await?;

    Ok(Json(stadium))
}

/// Delete a stadium (admin)
///
/// Fails while any match still refers to it.
#[utoipa::path(
    method(delete),
    path = "/{id}",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = CONFLICT, description = "Still referenced by matches", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such stadium", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn delete_stadium(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    use crate::schema::stadiums;

    claims.require_admin()?;

    let mut conn = state.db.get().await?;
    let stadium: Stadium = stadiums::table
        .find(id)
        .first(&mut conn)
        .await
        .optional()?
        .ok_or_else(RouteError::new_not_found)?;

    diesel::delete(stadiums::table.find(id))
        .execute(&mut conn)
        .await
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::ForeignKeyViolation,
                _,
            ) => RouteError::new_conflict()
                .set_public_error_message("Stadium is still used by matches"),
            other => other.into(),
        })?;

    Ok(MessageResponse::success(format!(
        "{} deleted.",
        stadium.name
    )))
}

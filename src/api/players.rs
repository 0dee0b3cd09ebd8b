use axum::{
    extract::{Path, State},
    Json,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    api::MessageResponse,
    models::{
        participation::Participation,
        players::{Eligibility, Player, PlayerPublic, StandingSummary},
    },
    ranking::{reliability_score, Tally},
    util::{
        errors::{RouteError, SimpleRouteErrorOutput},
        jwt::Claims,
    },
    AppState,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_player))
        .routes(routes!(own_eligibility))
        .routes(routes!(disable_player))
        .routes(routes!(enable_player))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    #[serde(flatten)]
    player: PlayerPublic,
    standing: StandingSummary,
    /// Reliability score; absent for players without scorable history.
    score: Option<f64>,
    tally: Tally,
}

/// Get a player's profile, standing and score
#[utoipa::path(
    method(get),
    path = "/{id}",
    responses(
        (status = OK, description = "Success", body = PlayerResponse, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such player", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<PlayerResponse>, RouteError> {
    use crate::schema::players;

    let mut conn = state.db.get().await?;

    let player: Player = players::table.find(id).first(&mut conn).await?;
    let history = Participation::for_player(player.id, &mut conn).await?;
    let tally = Tally::from_history(&history);
    let score = reliability_score(&tally, &player, time::OffsetDateTime::now_utc());

    Ok(Json(PlayerResponse {
        standing: StandingSummary::from(&player),
        score,
        tally,
        player: player.into(),
    }))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct EligibilityResponse {
    eligibility: Eligibility,
    can_participate: bool,
}

/// Check whether the calling player may join matches
///
/// Also lifts an expired suspension, so the answer is always current.
#[utoipa::path(
    method(get),
    path = "/self/eligibility",
    responses(
        (status = OK, description = "Success", body = EligibilityResponse, content_type = "application/json"),
        (status = UNAUTHORIZED, description = "Unauthorized", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn own_eligibility(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<EligibilityResponse>, RouteError> {
    use crate::schema::players;

    let mut conn = state.db.get().await?;

    let mut player: Player = players::table
        .find(claims.profile.id)
        .first(&mut conn)
        .await?;
    let eligibility = player.eligibility(&mut conn).await?;

    Ok(Json(EligibilityResponse {
        eligibility,
        can_participate: eligibility.can_participate(),
    }))
}

async fn set_disabled_flag(
    state: AppState,
    claims: Claims,
    target_id: i32,
    disabled: bool,
) -> Result<Json<MessageResponse>, RouteError> {
    use crate::schema::players;

    claims.require_admin()?;
    if claims.profile.id == target_id {
        return Err(RouteError::new_forbidden()
            .set_public_error_message("You cannot change the status of your own account"));
    }

    let mut conn = state.db.get().await?;

    let mut player: Player = players::table
        .find(target_id)
        .first(&mut conn)
        .await
        .optional()?
        .ok_or_else(RouteError::new_not_found)?;

    if player.is_disabled == disabled {
        let state_name = if disabled { "disabled" } else { "enabled" };
        return Ok(MessageResponse::warning(format!(
            "{} is already {state_name}.",
            player.username
        )));
    }

    player.set_disabled(disabled, &mut conn).await?;
    let action = if disabled { "disabled" } else { "re-enabled" };
    Ok(MessageResponse::success(format!(
        "{} has been {action}.",
        player.username
    )))
}

/// Disable an account (admin)
///
/// Permanent until explicitly re-enabled; self-targeting is rejected.
#[utoipa::path(
    method(post),
    path = "/{id}/disable",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin, or targeting yourself", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such player", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn disable_player(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    set_disabled_flag(state, claims, id, true).await
}

/// Re-enable a disabled account (admin)
#[utoipa::path(
    method(post),
    path = "/{id}/enable",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin, or targeting yourself", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such player", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn enable_player(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    set_disabled_flag(state, claims, id, false).await
}

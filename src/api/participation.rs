use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    api::MessageResponse,
    models::{
        matches::Match,
        participation::{Participation, ParticipationStatus},
        players::{NoShowReason, Player},
    },
    util::{
        errors::{RouteError, SimpleRouteErrorOutput},
        jwt::Claims,
    },
    AppState,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(mark_no_show, clear_no_show))
        .routes(routes!(remove_participant))
        .routes(routes!(restore_participant))
        .routes(routes!(delete_participation))
        .routes(routes!(mark_present, clear_present))
}

/// Sent back with 409 when an admin action needs a free spot that the match
/// does not have. The second request either confirms or raises the capacity.
#[derive(serde::Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapacityPrompt {
    pub message: String,
    pub max_players: i32,
    pub active_player_count: i64,
    /// Smallest capacity that would admit the player.
    pub required_capacity: i64,
}

impl CapacityPrompt {
    fn into_response(self) -> Response {
        (StatusCode::CONFLICT, Json(self)).into_response()
    }
}

async fn load_entry(
    id: i32,
    conn: &mut AsyncPgConnection,
) -> Result<(Participation, Match, Player), RouteError> {
    use crate::schema::{matches, players};

    let entry = Participation::find(id, conn)
        .await?
        .ok_or_else(|| {
            RouteError::new_not_found().set_public_error_message("Participation not found")
        })?;
    let fixture: Match = matches::table.find(entry.match_id).first(conn).await?;
    let player: Player = players::table.find(entry.player_id).first(conn).await?;
    Ok((entry, fixture, player))
}

fn attendance_window_gate(fixture: &Match) -> Result<(), RouteError> {
    if fixture.can_edit_attendance(OffsetDateTime::now_utc()) {
        Ok(())
    } else {
        Err(RouteError::new_bad_request().set_public_error_message(
            "Attendance for this match can no longer be edited (editable up to 24 hours after match time)",
        ))
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct NoShowRequest {
    reason: NoShowReason,
}

/// Mark a no-show (admin)
///
/// Classifies the absence and applies the license deduction to the player.
#[utoipa::path(
    method(post),
    path = "/{id}/noShow",
    request_body = NoShowRequest,
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Attendance window closed", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such participation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn mark_no_show(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<NoShowRequest>,
) -> Result<Json<MessageResponse>, RouteError> {
    claims.require_admin()?;

    let mut conn = state.db.get().await?;
    let (mut entry, fixture, mut player) = load_entry(id, &mut conn).await?;
    attendance_window_gate(&fixture)?;

    if entry.is_no_show {
        return Ok(MessageResponse::warning(format!(
            "{} is already marked as no-show.",
            player.username
        )));
    }

    let applied = entry
        .mark_no_show(&mut player, payload.reason, &mut conn)
        .await?;

    let mut message = format!(
        "{} marked as no-show ({}).",
        player.username,
        payload.reason.label()
    );
    if !applied {
        message.push_str(" License unchanged: player is not currently eligible.");
    }
    Ok(MessageResponse::success(message))
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
struct ClearNoShowRequest {
    /// Proceed even if the match stays full and the player gets no spot back.
    #[serde(default)]
    confirm: bool,
    /// Raise the match capacity so the player gets their spot back.
    new_capacity: Option<i32>,
}

/// Undo a no-show mark (admin)
///
/// Reverses the license deduction. When the cleared player would need a spot
/// in a full match, the first call comes back 409 with a capacity prompt;
/// repeat with `confirm` or `newCapacity`.
#[utoipa::path(
    method(delete),
    path = "/{id}/noShow",
    request_body = ClearNoShowRequest,
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = CONFLICT, description = "Match is full, negotiation required", body = CapacityPrompt, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Attendance window closed or capacity too small", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such participation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn clear_no_show(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    payload: Option<Json<ClearNoShowRequest>>,
) -> Result<Response, RouteError> {
    claims.require_admin()?;
    let Json(payload) = payload.unwrap_or_default();

    let mut conn = state.db.get().await?;
    let (mut entry, mut fixture, mut player) = load_entry(id, &mut conn).await?;
    attendance_window_gate(&fixture)?;

    if !entry.is_no_show {
        return Ok(MessageResponse::warning(format!(
            "{} is not marked as no-show.",
            player.username
        ))
        .into_response());
    }

    // Clearing the mark puts a joined, non-removed player back on the active
    // roster, which needs a spot.
    let needs_spot = entry.status == ParticipationStatus::Joined && !entry.removed;
    let mut capacity_note = None;
    if needs_spot {
        let summary = fixture.summary(&mut conn).await?;
        if summary.is_full {
            if let Some(new_capacity) = payload.new_capacity {
                raise_capacity(&mut fixture, new_capacity, summary.active_player_count, &mut conn)
                    .await?;
                capacity_note = Some(format!("Match capacity raised to {new_capacity}."));
            } else if !payload.confirm {
                return Ok(CapacityPrompt {
                    message: format!(
                        "The match is full. Confirm to clear the no-show for {} anyway, or raise the capacity.",
                        player.username
                    ),
                    max_players: fixture.max_players,
                    active_player_count: summary.active_player_count,
                    required_capacity: summary.active_player_count + 1,
                }
                .into_response());
            }
        }
    }

    entry.clear_no_show(&mut player, &mut conn).await?;

    let mut message = format!("No-show removed for {}.", player.username);
    if let Some(note) = capacity_note {
        message = format!("{note} {message}");
    }
    Ok(MessageResponse::success(message).into_response())
}

async fn raise_capacity(
    fixture: &mut Match,
    new_capacity: i32,
    active_count: i64,
    conn: &mut AsyncPgConnection,
) -> Result<(), RouteError> {
    if i64::from(new_capacity) <= active_count {
        return Err(
            RouteError::new_bad_request().set_public_error_message(&format!(
                "New capacity must be above the current active count ({active_count})"
            )),
        );
    }
    fixture.set_max_players(new_capacity, conn).await?;
    Ok(())
}

/// Remove a participant from the roster (admin)
///
/// Soft delete: the entry is hidden from the active roster but keeps its
/// join/leave history.
#[utoipa::path(
    method(post),
    path = "/{id}/remove",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such participation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn remove_participant(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    claims.require_admin()?;

    let mut conn = state.db.get().await?;
    let (mut entry, _, player) = load_entry(id, &mut conn).await?;

    if entry.removed {
        return Ok(MessageResponse::warning(format!(
            "{} is already removed.",
            player.username
        )));
    }

    entry.remove(&mut conn).await?;
    Ok(MessageResponse::success(format!(
        "{} removed from the roster.",
        player.username
    )))
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
struct RestoreRequest {
    /// Raise the match capacity to make room for the restored player.
    new_capacity: Option<i32>,
}

/// Restore a removed participant (admin)
///
/// Goes through directly while a spot is free; into a full match the first
/// call comes back 409 and a `newCapacity` is required.
#[utoipa::path(
    method(post),
    path = "/{id}/restore",
    request_body = RestoreRequest,
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = CONFLICT, description = "Match is full, negotiation required", body = CapacityPrompt, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Capacity too small", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such participation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn restore_participant(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    payload: Option<Json<RestoreRequest>>,
) -> Result<Response, RouteError> {
    claims.require_admin()?;
    let Json(payload) = payload.unwrap_or_default();

    let mut conn = state.db.get().await?;
    let (mut entry, mut fixture, player) = load_entry(id, &mut conn).await?;

    if !entry.removed {
        return Ok(MessageResponse::warning(format!(
            "{} is not removed.",
            player.username
        ))
        .into_response());
    }

    let summary = fixture.summary(&mut conn).await?;
    let mut capacity_note = None;
    if summary.is_full {
        match payload.new_capacity {
            Some(new_capacity) => {
                raise_capacity(&mut fixture, new_capacity, summary.active_player_count, &mut conn)
                    .await?;
                capacity_note = Some(format!("Match capacity raised to {new_capacity}."));
            }
            None => {
                return Ok(CapacityPrompt {
                    message: format!(
                        "The match is full. Raise the capacity to restore {}.",
                        player.username
                    ),
                    max_players: fixture.max_players,
                    active_player_count: summary.active_player_count,
                    required_capacity: summary.active_player_count + 1,
                }
                .into_response());
            }
        }
    }

    entry.restore(&mut conn).await?;

    let mut message = format!("{} restored to the roster.", player.username);
    if let Some(note) = capacity_note {
        message = format!("{note} {message}");
    }
    Ok(MessageResponse::success(message).into_response())
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
struct HardDeleteRequest {
    #[serde(default)]
    confirm: bool,
}

/// Permanently delete a participation record (admin)
///
/// Irreversible, so it refuses to run without the confirmation flag.
#[utoipa::path(
    method(delete),
    path = "/{id}",
    request_body = HardDeleteRequest,
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Missing confirmation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such participation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn delete_participation(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    payload: Option<Json<HardDeleteRequest>>,
) -> Result<Json<MessageResponse>, RouteError> {
    claims.require_admin()?;
    let Json(payload) = payload.unwrap_or_default();

    if !payload.confirm {
        return Err(RouteError::new_bad_request().set_public_error_message(
            "Confirmation required: this permanently deletes the participation record",
        ));
    }

    let mut conn = state.db.get().await?;
    let (entry, _, player) = load_entry(id, &mut conn).await?;

    entry.hard_delete(&mut conn).await?;
    Ok(MessageResponse::success(format!(
        "Participation record for {} permanently deleted.",
        player.username
    )))
}

/// Mark a participant as physically present (admin)
#[utoipa::path(
    method(post),
    path = "/{id}/present",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Attendance window closed", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such participation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn mark_present(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    claims.require_admin()?;

    let mut conn = state.db.get().await?;
    let (mut entry, fixture, player) = load_entry(id, &mut conn).await?;
    attendance_window_gate(&fixture)?;

    if entry.is_present {
        return Ok(MessageResponse::warning(format!(
            "{} is already marked present.",
            player.username
        )));
    }

    entry.set_present(true, &mut conn).await?;
    Ok(MessageResponse::success(format!(
        "{} marked present.",
        player.username
    )))
}

/// Undo a presence mark (admin)
#[utoipa::path(
    method(delete),
    path = "/{id}/present",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Attendance window closed", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such participation", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn clear_present(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    claims.require_admin()?;

    let mut conn = state.db.get().await?;
    let (mut entry, fixture, player) = load_entry(id, &mut conn).await?;
    attendance_window_gate(&fixture)?;

    if !entry.is_present {
        return Ok(MessageResponse::warning(format!(
            "{} is not marked present.",
            player.username
        )));
    }

    entry.set_present(false, &mut conn).await?;
    Ok(MessageResponse::success(format!(
        "Presence mark removed for {}.",
        player.username
    )))
}

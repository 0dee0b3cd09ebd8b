use axum::{
    extract::{Path, Query, State},
    Json,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use time::{Date, Time};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    api::MessageResponse,
    models::{
        matches::{Match, MatchChangeset, MatchSummary, NewMatch},
        participation::{JoinOutcome, Participation, ParticipationStatus},
        players::{Eligibility, Player, PlayerPublic},
        stadiums::Stadium,
    },
    util::{
        errors::{RouteError, SimpleRouteErrorOutput},
        jwt::Claims,
    },
    AppState,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_matches, create_match))
        .routes(routes!(get_match, update_match, delete_match))
        .routes(routes!(get_shared_match))
        .routes(routes!(join_match))
        .routes(routes!(leave_match))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct ListMatchesParams {
    /// Only matches from today onwards, soonest first.
    #[serde(default)]
    upcoming: bool,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct MatchListEntry {
    #[serde(flatten)]
    fixture: Match,
    summary: MatchSummary,
    /// The calling player's roster entry, when authenticated and present.
    #[serde(skip_serializing_if = "Option::is_none")]
    own_participation: Option<Participation>,
}

/// List matches
///
/// With a token, each row also carries the caller's own roster entry so the
/// frontend can render join/leave buttons.
#[utoipa::path(
    method(get),
    path = "",
    params(
        ("upcoming" = bool, Query, description = "Only matches from today onwards")
    ),
    responses(
        (status = OK, description = "Success", body = Vec<MatchListEntry>, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn list_matches(
    State(state): State<AppState>,
    claims: Result<Claims, RouteError>,
    Query(params): Query<ListMatchesParams>,
) -> Result<Json<Vec<MatchListEntry>>, RouteError> {
    let mut conn = state.db.get().await?;

    let fixtures = if params.upcoming {
        Match::upcoming(&mut conn).await?
    } else {
        Match::all_latest_first(&mut conn).await?
    };

    let caller_id = claims.ok().map(|c| c.profile.id);

    let mut entries = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        let summary = fixture.summary(&mut conn).await?;
        let own_participation = match caller_id {
            Some(player_id) => {
                Participation::for_player_and_match(player_id, fixture.id, &mut conn).await?
            }
            None => None,
        };
        entries.push(MatchListEntry {
            fixture,
            summary,
            own_participation,
        });
    }

    Ok(Json(entries))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct RosterEntry {
    #[serde(flatten)]
    participation: Participation,
    player: PlayerPublic,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct MatchResponse {
    #[serde(flatten)]
    fixture: Match,
    stadium: Stadium,
    summary: MatchSummary,
    /// Occupying a spot: joined, not removed, not a no-show.
    active: Vec<RosterEntry>,
    left: Vec<RosterEntry>,
    no_shows: Vec<RosterEntry>,
    removed: Vec<RosterEntry>,
}

async fn build_match_response(
    fixture: Match,
    conn: &mut AsyncPgConnection,
) -> Result<MatchResponse, RouteError> {
    use crate::schema::stadiums;

    let stadium: Stadium = stadiums::table
        .find(fixture.stadium_id)
        .first(conn)
        .await?;
    let summary = fixture.summary(conn).await?;

    let mut active = Vec::new();
    let mut left = Vec::new();
    let mut no_shows = Vec::new();
    let mut removed = Vec::new();
    for (participation, player) in Participation::for_match(fixture.id, conn).await? {
        let entry = RosterEntry {
            participation,
            player: player.into(),
        };
        if entry.participation.removed {
            removed.push(entry);
        } else if entry.participation.is_no_show {
            no_shows.push(entry);
        } else if entry.participation.status == ParticipationStatus::Left {
            left.push(entry);
        } else {
            active.push(entry);
        }
    }

    Ok(MatchResponse {
        fixture,
        stadium,
        summary,
        active,
        left,
        no_shows,
        removed,
    })
}

/// Get a match with its roster
#[utoipa::path(
    method(get),
    path = "/{id}",
    responses(
        (status = OK, description = "Success", body = MatchResponse, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such match", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MatchResponse>, RouteError> {
    use crate::schema::matches;

    let mut conn = state.db.get().await?;
    let fixture: Match = matches::table.find(id).first(&mut conn).await?;

    Ok(Json(build_match_response(fixture, &mut conn).await?))
}

/// Get a match by its share token
///
/// Public lookup behind an unguessable token, for roster links passed around
/// in group chats.
#[utoipa::path(
    method(get),
    path = "/shared/{token}",
    responses(
        (status = OK, description = "Success", body = MatchResponse, content_type = "application/json"),
        (status = NOT_FOUND, description = "Unknown token", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn get_shared_match(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MatchResponse>, RouteError> {
    let mut conn = state.db.get().await?;

    let fixture = Match::find_by_share_token(&token, &mut conn)
        .await?
        .ok_or_else(RouteError::new_not_found)?;

    Ok(Json(build_match_response(fixture, &mut conn).await?))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct CreateMatchRequest {
    date: Date,
    #[schema(value_type = Option<String>)]
    time: Option<Time>,
    stadium_id: i32,
    max_players: i32,
}

/// Create a match (admin)
#[utoipa::path(
    method(post),
    path = "",
    request_body = CreateMatchRequest,
    responses(
        (status = OK, description = "Success", body = Match, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Invalid parameters", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such stadium", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn create_match(
    State(state): State<AppState>,
    claims: Claims,
    Json(payload): Json<CreateMatchRequest>,
) -> Result<Json<Match>, RouteError> {
    use crate::schema::stadiums;

    claims.require_admin()?;
    if payload.max_players < 1 {
        return Err(
            RouteError::new_bad_request().set_public_error_message("Max players must be at least 1")
        );
    }

    let mut conn = state.db.get().await?;

    stadiums::table
        .find(payload.stadium_id)
        .first::<Stadium>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| RouteError::new_not_found().set_public_error_message("Stadium not found"))?;

    let fixture = NewMatch {
        date: payload.date,
        time: payload.time,
        stadium_id: payload.stadium_id,
        max_players: payload.max_players,
    }
    .create(&mut conn)
    .await?;

    Ok(Json(fixture))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct UpdateMatchRequest {
    date: Option<Date>,
    #[schema(value_type = Option<String>)]
    time: Option<Time>,
    stadium_id: Option<i32>,
    max_players: Option<i32>,
}

/// Edit a match (admin)
///
/// Only while the match edit window is open, and capacity can never drop
/// below the players already on the roster.
#[utoipa::path(
    method(patch),
    path = "/{id}",
    request_body = UpdateMatchRequest,
    responses(
        (status = OK, description = "Success", body = Match, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Window closed or invalid capacity", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such match", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn update_match(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateMatchRequest>,
) -> Result<Json<Match>, RouteError> {
    use crate::schema::matches;

    claims.require_admin()?;

    let mut conn = state.db.get().await?;
    let fixture: Match = matches::table.find(id).first(&mut conn).await?;

    if !fixture.can_edit_match(time::OffsetDateTime::now_utc()) {
        return Err(RouteError::new_bad_request().set_public_error_message(
            "This match can no longer be edited (editable up to 1 hour after match time)",
        ));
    }

    if payload.date.is_none()
        && payload.time.is_none()
        && payload.stadium_id.is_none()
        && payload.max_players.is_none()
    {
        return Ok(Json(fixture));
    }

    if let Some(max_players) = payload.max_players {
        if max_players < 1 {
            return Err(RouteError::new_bad_request()
                .set_public_error_message("Max players must be at least 1"));
        }
        let joined_count = fixture.count_active_players(&mut conn).await?;
        if i64::from(max_players) < joined_count {
            return Err(
                RouteError::new_bad_request().set_public_error_message(&format!(
                    "Cannot set max players below current joined count ({joined_count})"
                )),
            );
        }
    }

    let updated = MatchChangeset {
        date: payload.date,
        time: payload.time,
        stadium_id: payload.stadium_id,
        max_players: payload.max_players,
    }
    .apply(fixture.id, &mut conn)
    .await?;

    Ok(Json(updated))
}

/// Delete a match (admin)
///
/// Past matches are view-only and cannot be deleted.
#[utoipa::path(
    method(delete),
    path = "/{id}",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Edit window closed", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not an admin", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such match", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn delete_match(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    use crate::schema::matches;

    claims.require_admin()?;

    let mut conn = state.db.get().await?;
    let fixture: Match = matches::table.find(id).first(&mut conn).await?;

    if !fixture.can_edit_match(time::OffsetDateTime::now_utc()) {
        return Err(RouteError::new_bad_request().set_public_error_message(
            "This match can no longer be edited (editable up to 1 hour after match time)",
        ));
    }

    fixture.delete(&mut conn).await?;
    Ok(MessageResponse::success("Match deleted."))
}

fn eligibility_rejection(eligibility: Eligibility, player: &Player) -> RouteError {
    let message = match eligibility {
        Eligibility::InactiveOrRecruiter => "Your account cannot join matches".to_owned(),
        Eligibility::Disabled => "Your account is disabled".to_owned(),
        Eligibility::Suspended => match player.suspension_until {
            Some(until) => format!("You are suspended until {}", until.date()),
            None => "You are suspended".to_owned(),
        },
        Eligibility::Eligible => unreachable!("eligible players are not rejected"),
    };
    RouteError::new_forbidden().set_public_error_message(&message)
}

/// Join a match
///
/// Joining deliberately skips the capacity check; the roster can overbook and
/// the display layer shows the match as full.
#[utoipa::path(
    method(post),
    path = "/{id}/join",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = FORBIDDEN, description = "Not eligible to participate", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such match", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = UNAUTHORIZED, description = "Unauthorized", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn join_match(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    use crate::schema::{matches, players};

    let mut conn = state.db.get().await?;

    let fixture: Match = matches::table.find(id).first(&mut conn).await?;
    let mut player: Player = players::table
        .find(claims.profile.id)
        .first(&mut conn)
        .await?;

    let eligibility = player.eligibility(&mut conn).await?;
    if !eligibility.can_participate() {
        return Err(eligibility_rejection(eligibility, &player));
    }

    let (_, outcome) = Participation::join(player.id, fixture.id, &mut conn).await?;
    Ok(match outcome {
        JoinOutcome::Created | JoinOutcome::Rejoined => {
            MessageResponse::success("You joined the match.")
        }
        JoinOutcome::AlreadyJoined => MessageResponse::warning("You already joined this match."),
    })
}

/// Leave a match
///
/// Leaving a match never joined is quietly ignored.
#[utoipa::path(
    method(post),
    path = "/{id}/leave",
    responses(
        (status = OK, description = "Success", body = MessageResponse, content_type = "application/json"),
        (status = NOT_FOUND, description = "No such match", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = UNAUTHORIZED, description = "Unauthorized", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    ),
    security(
        ("token_jwt" = [])
    )
)]
async fn leave_match(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, RouteError> {
    use crate::schema::matches;

    let mut conn = state.db.get().await?;
    let fixture: Match = matches::table.find(id).first(&mut conn).await?;

    Ok(
        match Participation::leave(claims.profile.id, fixture.id, &mut conn).await? {
            Some(_) => MessageResponse::success("You left the match."),
            None => MessageResponse::warning("You never joined this match."),
        },
    )
}

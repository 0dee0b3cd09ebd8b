use std::collections::HashMap;

use axum::{extract::State, Json};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    models::{
        matches::Match,
        participation::{Participation, ParticipationStatus},
        players::{Eligibility, Player, PlayerPublic},
    },
    ranking::{
        medal_for, medal_tiers, recent_form, reliability_score, FormMark, Medal, PlayerBreakdown,
        Tally,
    },
    util::errors::{RouteError, SimpleRouteErrorOutput},
    AppState,
};

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_leaderboard))
        .routes(routes!(get_stats))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct LeaderboardRow {
    #[serde(flatten)]
    player: PlayerPublic,
    /// Reliability score on a 0-100 scale; absent for players without
    /// scorable history.
    score: Option<f64>,
    medal: Option<Medal>,
    eligibility: Eligibility,
    recent_form: Vec<FormMark>,
    tally: Tally,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct LeaderboardResponse {
    rows: Vec<LeaderboardRow>,
}

/// Get the reliability leaderboard
///
/// Recomputed from the full participation history on every call. Players
/// without scorable history sort last without a score; medals go to the top
/// three distinct scores among currently eligible players.
#[utoipa::path(
    method(get),
    path = "/leaderboard",
    responses(
        (status = OK, description = "Success", body = LeaderboardResponse, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn get_leaderboard(
    State(state): State<AppState>,
) -> Result<Json<LeaderboardResponse>, RouteError> {
    use crate::schema::{matches, participation, players};

    let mut conn = state.db.get().await?;
    let now = OffsetDateTime::now_utc();

    let all_players: Vec<Player> = players::table
        .order(players::username.asc())
        .load(&mut conn)
        .await?;
    let history: Vec<(Participation, Match)> = participation::table
        .inner_join(matches::table)
        .load(&mut conn)
        .await?;

    let mut by_player: HashMap<i32, Vec<(Participation, Match)>> = HashMap::new();
    for pair in history {
        by_player.entry(pair.0.player_id).or_default().push(pair);
    }
    let empty = Vec::new();

    struct Scored {
        player: Player,
        tally: Tally,
        score: Option<f64>,
        eligibility: Eligibility,
        form: Vec<FormMark>,
    }

    let mut scored: Vec<Scored> = all_players
        .into_iter()
        .map(|player| {
            let pairs = by_player.get(&player.id).unwrap_or(&empty);
            let entries: Vec<Participation> =
                pairs.iter().map(|(entry, _)| entry.clone()).collect();
            let tally = Tally::from_history(&entries);
            let score = reliability_score(&tally, &player, now);
            Scored {
                tally,
                score,
                eligibility: player.eligibility_at(now),
                form: recent_form(pairs, now),
                player,
            }
        })
        .collect();

    // Medal tiers are collected from eligible players only, so an ineligible
    // player can never medal, not even by sharing a tier value.
    let eligible_scores: Vec<f64> = scored
        .iter()
        .filter(|row| row.eligibility.can_participate())
        .filter_map(|row| row.score)
        .collect();
    let tiers = medal_tiers(&eligible_scores);

    scored.sort_by(|a, b| match (a.score, b.score) {
        (Some(x), Some(y)) => y
            .partial_cmp(&x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.player.username.cmp(&b.player.username)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.player.username.cmp(&b.player.username),
    });

    let rows = scored
        .into_iter()
        .map(|row| LeaderboardRow {
            medal: match (row.eligibility.can_participate(), row.score) {
                (true, Some(score)) => medal_for(&tiers, score),
                _ => None,
            },
            score: row.score,
            eligibility: row.eligibility,
            recent_form: row.form,
            tally: row.tally,
            player: row.player.into(),
        })
        .collect();

    Ok(Json(LeaderboardResponse { rows }))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    /// Matches already played.
    total_matches: usize,
    /// Mean of per-match attended/capacity ratios, as a percentage.
    avg_attendance_percent: f64,
    players: Vec<PlayerBreakdown>,
}

/// Get the stats dashboard
///
/// Per-match average attendance plus a per-player breakdown of enrollment
/// outcomes, sorted by attendance percentage.
#[utoipa::path(
    method(get),
    path = "/stats",
    responses(
        (status = OK, description = "Success", body = StatsResponse, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, RouteError> {
    use crate::schema::{matches, participation, players};

    let mut conn = state.db.get().await?;
    let today = OffsetDateTime::now_utc().date();

    let past_matches: Vec<Match> = matches::table
        .filter(matches::date.lt(today))
        .load(&mut conn)
        .await?;
    let all_players: Vec<Player> = players::table
        .order(players::username.asc())
        .load(&mut conn)
        .await?;
    let entries: Vec<Participation> = participation::table.load(&mut conn).await?;

    // Attendance per past match: joined and not removed, over capacity.
    let mut attended_per_match: HashMap<i32, i64> = HashMap::new();
    for entry in &entries {
        if entry.status == ParticipationStatus::Joined && !entry.removed {
            *attended_per_match.entry(entry.match_id).or_default() += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let avg_attendance_percent = if past_matches.is_empty() {
        0.0
    } else {
        let ratio_sum: f64 = past_matches
            .iter()
            .map(|m| {
                let attended = attended_per_match.get(&m.id).copied().unwrap_or(0);
                attended as f64 / f64::from(m.max_players)
            })
            .sum();
        (ratio_sum / past_matches.len() as f64 * 100.0 * 100.0).round() / 100.0
    };

    let mut by_player: HashMap<i32, Vec<Participation>> = HashMap::new();
    for entry in entries {
        by_player.entry(entry.player_id).or_default().push(entry);
    }

    let mut breakdowns: Vec<PlayerBreakdown> = all_players
        .into_iter()
        .map(|player| {
            let history = by_player.remove(&player.id).unwrap_or_default();
            PlayerBreakdown::new(player.username, Tally::from_history(&history))
        })
        .collect();
    breakdowns.sort_by(|a, b| {
        b.perc_attended
            .partial_cmp(&a.perc_attended)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(Json(StatsResponse {
        total_matches: past_matches.len(),
        avg_attendance_percent,
        players: breakdowns,
    }))
}

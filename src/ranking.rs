//! Read-only reliability scoring over participation history.
//!
//! Everything here is recomputed from scratch on every request; nothing in
//! this module writes. The one write on the read path (lifting an expired
//! suspension) lives with the standing model, not here, which is why the
//! ranking side uses the pure `eligibility_at` check.

use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::models::{
    matches::Match,
    participation::{Participation, ParticipationStatus},
    players::{NoShowReason, Player, MAX_POINTS, SUSPENSION_LENGTH},
};

const ATTENDANCE_WEIGHT: f64 = 0.7;
const POINTS_WEIGHT: f64 = 0.3;
/// Lifetime scar per past suspension, capped.
const PAST_SUSPENSION_SCAR: f64 = 0.02;
const PAST_SUSPENSION_SCAR_CAP: f64 = 0.10;
/// How many settled matches the form indicator covers.
pub const RECENT_FORM_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FormMark {
    Present,
    Neutral,
    Absent,
}

/// Attendance counts over one player's full history.
#[derive(Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub enrolled: usize,
    pub attended: usize,
    /// Denominator of the attendance ratio: everything except excused
    /// absences and neutral early-leaves.
    pub eligible: usize,
    pub left: usize,
    pub absent_excused: usize,
    pub absent_not_excused: usize,
    pub absent_last_minute: usize,
}

fn attended(entry: &Participation) -> bool {
    entry.status == ParticipationStatus::Joined && !entry.removed && !entry.is_no_show
}

/// Whether the entry counts toward the scoring denominator. Excused absences
/// and plain leaves are neutral: they neither help nor hurt.
fn counts_toward_score(entry: &Participation) -> bool {
    if entry.is_no_show && entry.no_show_reason == Some(NoShowReason::Excused) {
        return false;
    }
    if entry.status == ParticipationStatus::Left && !entry.is_no_show {
        return false;
    }
    true
}

impl Tally {
    #[must_use]
    pub fn from_history(history: &[Participation]) -> Self {
        let mut tally = Self {
            enrolled: history.len(),
            ..Self::default()
        };
        for entry in history {
            if attended(entry) {
                tally.attended += 1;
            }
            if counts_toward_score(entry) {
                tally.eligible += 1;
            }
            if entry.status == ParticipationStatus::Left {
                tally.left += 1;
            }
            if entry.is_no_show {
                match entry.no_show_reason {
                    Some(NoShowReason::Excused) => tally.absent_excused += 1,
                    Some(NoShowReason::NotExcused) => tally.absent_not_excused += 1,
                    Some(NoShowReason::LastMinute) => tally.absent_last_minute += 1,
                    None => {}
                }
            }
        }
        tally
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted reliability score on a 0–100 scale.
///
/// `None` when the player has no scorable history yet; new players are kept
/// out of the ranking rather than pinned to the bottom. A genuine score of
/// zero stays `Some(0.0)` — the distinction is keyed on the eligible count,
/// never on the numeric value.
#[must_use]
pub fn reliability_score(tally: &Tally, player: &Player, now: OffsetDateTime) -> Option<f64> {
    if tally.eligible == 0 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let attendance_score = tally.attended as f64 / tally.eligible as f64;
    let points_ratio = f64::from(player.points) / f64::from(MAX_POINTS);

    let suspension_penalty = match (player.is_suspended, player.suspension_until) {
        (true, Some(until)) => {
            ((until - now).as_seconds_f64() / SUSPENSION_LENGTH.as_seconds_f64()).clamp(0.0, 1.0)
        }
        _ => 0.0,
    };
    let past_penalty =
        (PAST_SUSPENSION_SCAR * f64::from(player.suspension_count)).min(PAST_SUSPENSION_SCAR_CAP);

    let raw = (attendance_score * ATTENDANCE_WEIGHT + points_ratio * POINTS_WEIGHT)
        * 100.0
        * (1.0 - suspension_penalty)
        * (1.0 - past_penalty);

    let rounded = round2(raw);
    // 99.995-style artifacts round up to a "100.00" that never quite compares
    // equal; snap those to the ceiling.
    if rounded.trunc() >= 100.0 {
        Some(100.0)
    } else {
        Some(rounded)
    }
}

fn score_key(score: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    {
        (score * 100.0).round() as i64
    }
}

/// The up-to-three distinct score values (as centi-keys, descending) that
/// earn a medal. Only currently-eligible players' scores belong in here.
#[must_use]
pub fn medal_tiers(eligible_scores: &[f64]) -> Vec<i64> {
    let mut keys: Vec<i64> = eligible_scores.iter().copied().map(score_key).collect();
    keys.sort_unstable_by(|a, b| b.cmp(a));
    keys.dedup();
    keys.truncate(3);
    keys
}

/// Medal for a score value, by tier. Equal scores share a tier, so this is a
/// lookup by value rather than by row position.
#[must_use]
pub fn medal_for(tiers: &[i64], score: f64) -> Option<Medal> {
    match tiers.iter().position(|&key| key == score_key(score)) {
        Some(0) => Some(Medal::Gold),
        Some(1) => Some(Medal::Silver),
        Some(2) => Some(Medal::Bronze),
        _ => None,
    }
}

/// Form glyphs for the player's most recent settled matches (those whose
/// attendance-edit window has closed), oldest first, capped at
/// [`RECENT_FORM_LEN`].
#[must_use]
pub fn recent_form(history: &[(Participation, Match)], now: OffsetDateTime) -> Vec<FormMark> {
    let mut settled: Vec<&(Participation, Match)> = history
        .iter()
        .filter(|(_, m)| !m.can_edit_attendance(now))
        .collect();
    settled.sort_by_key(|(_, m)| m.starts_at());

    settled
        .iter()
        .rev()
        .take(RECENT_FORM_LEN)
        .rev()
        .map(|(entry, _)| {
            if attended(entry) {
                FormMark::Present
            } else if entry.is_no_show && entry.no_show_reason == Some(NoShowReason::Excused) {
                FormMark::Neutral
            } else {
                FormMark::Absent
            }
        })
        .collect()
}

/// Per-player breakdown for the stats dashboard, percentages of enrollment
/// rounded to two decimals.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerBreakdown {
    pub username: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub perc_attended: f64,
    pub perc_left: f64,
    pub perc_absent_excused: f64,
    pub perc_absent_not_excused: f64,
    pub perc_absent_last_minute: f64,
}

impl PlayerBreakdown {
    #[must_use]
    pub fn new(username: String, tally: Tally) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let percent = |count: usize| {
            if tally.enrolled == 0 {
                0.0
            } else {
                round2(count as f64 / tally.enrolled as f64 * 100.0)
            }
        };
        Self {
            perc_attended: percent(tally.attended),
            perc_left: percent(tally.left),
            perc_absent_excused: percent(tally.absent_excused),
            perc_absent_not_excused: percent(tally.absent_not_excused),
            perc_absent_last_minute: percent(tally.absent_last_minute),
            username,
            tally,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::{
        macros::{date, datetime},
        Date, Duration,
    };

    use super::*;
    use crate::models::players::AccountType;

    const NOW: OffsetDateTime = datetime!(2025-06-15 12:00 UTC);

    fn player(points: i32) -> Player {
        Player {
            id: 1,
            username: "alex123".to_owned(),
            password_hash: String::new(),
            account_type: AccountType::Player,
            is_recruiter: false,
            is_disabled: false,
            is_active: true,
            points,
            is_suspended: false,
            suspension_until: None,
            suspension_count: 0,
            joined_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    fn entry(
        status: ParticipationStatus,
        removed: bool,
        no_show: Option<NoShowReason>,
    ) -> Participation {
        Participation {
            id: 0,
            player_id: 1,
            match_id: 1,
            status,
            status_time: NOW,
            removed,
            removed_time: None,
            is_no_show: no_show.is_some(),
            no_show_reason: no_show,
            no_show_time: None,
            is_present: false,
        }
    }

    fn attended_entry() -> Participation {
        entry(ParticipationStatus::Joined, false, None)
    }

    #[test]
    fn no_history_means_no_score() {
        assert_eq!(reliability_score(&Tally::default(), &player(15), NOW), None);
    }

    #[test]
    fn excused_and_plain_leaves_are_neutral() {
        let history = vec![
            attended_entry(),
            entry(ParticipationStatus::Left, false, None),
            entry(
                ParticipationStatus::Joined,
                false,
                Some(NoShowReason::Excused),
            ),
        ];
        let tally = Tally::from_history(&history);
        assert_eq!(tally.enrolled, 3);
        assert_eq!(tally.attended, 1);
        assert_eq!(tally.eligible, 1);
    }

    #[test]
    fn perfect_record_scores_exactly_100() {
        let history = vec![attended_entry(), attended_entry()];
        let tally = Tally::from_history(&history);
        assert_eq!(reliability_score(&tally, &player(15), NOW), Some(100.0));
    }

    #[test]
    fn weighted_formula() {
        let mut history = vec![
            attended_entry(),
            attended_entry(),
            attended_entry(),
            entry(
                ParticipationStatus::Joined,
                false,
                Some(NoShowReason::NotExcused),
            ),
        ];
        // 3 attended of 4 eligible, 9 of 15 points:
        // (0.75 * 0.7 + 0.6 * 0.3) * 100 = 70.5
        let tally = Tally::from_history(&history);
        assert_eq!(reliability_score(&tally, &player(9), NOW), Some(70.5));

        // a removed entry still counts in the denominator
        history.push(entry(ParticipationStatus::Joined, true, None));
        let tally = Tally::from_history(&history);
        // (0.6 * 0.7 + 0.6 * 0.3) * 100 = 60
        assert_eq!(reliability_score(&tally, &player(9), NOW), Some(60.0));
    }

    #[test]
    fn zero_score_is_not_null() {
        let history = vec![entry(
            ParticipationStatus::Joined,
            false,
            Some(NoShowReason::NotExcused),
        )];
        let tally = Tally::from_history(&history);
        assert_eq!(reliability_score(&tally, &player(0), NOW), Some(0.0));
    }

    #[test]
    fn active_suspension_decays_linearly() {
        let mut suspended = player(15);
        suspended.is_suspended = true;
        // half of the 15-day suspension left -> half the score gone
        suspended.suspension_until = Some(NOW + SUSPENSION_LENGTH / 2);

        let history = vec![attended_entry()];
        let tally = Tally::from_history(&history);
        assert_eq!(reliability_score(&tally, &suspended, NOW), Some(50.0));
    }

    #[test]
    fn past_suspensions_scar_up_to_ten_percent() {
        let history = vec![attended_entry()];
        let tally = Tally::from_history(&history);

        let mut scarred = player(15);
        scarred.suspension_count = 2;
        assert_eq!(reliability_score(&tally, &scarred, NOW), Some(96.0));

        scarred.suspension_count = 9;
        assert_eq!(reliability_score(&tally, &scarred, NOW), Some(90.0));
    }

    #[test]
    fn near_ceiling_scores_snap_to_100() {
        let mut barely_suspended = player(15);
        barely_suspended.is_suspended = true;
        // 30 seconds left on the clock: raw score 99.9977, rounds to 100.00
        barely_suspended.suspension_until = Some(NOW + Duration::seconds(30));

        let history = vec![attended_entry()];
        let tally = Tally::from_history(&history);
        assert_eq!(
            reliability_score(&tally, &barely_suspended, NOW),
            Some(100.0)
        );
    }

    #[test]
    fn medals_go_to_distinct_scores() {
        let tiers = medal_tiers(&[95.0, 95.0, 90.0, 88.5, 70.0]);
        assert_eq!(tiers.len(), 3);
        assert_eq!(medal_for(&tiers, 95.0), Some(Medal::Gold));
        assert_eq!(medal_for(&tiers, 90.0), Some(Medal::Silver));
        assert_eq!(medal_for(&tiers, 88.5), Some(Medal::Bronze));
        assert_eq!(medal_for(&tiers, 70.0), None);
    }

    #[test]
    fn scores_outside_the_tier_list_never_medal() {
        // an ineligible player's score is kept out of the tier list entirely,
        // so even a table-topping value comes back medal-less
        let tiers = medal_tiers(&[90.0, 85.0]);
        assert_eq!(medal_for(&tiers, 99.0), None);
    }

    fn settled_match(id: i32, date: Date) -> Match {
        Match {
            id,
            date,
            time: None,
            stadium_id: 1,
            max_players: 10,
            share_token: None,
            created_at: datetime!(2025-01-01 00:00 UTC),
            updated_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    #[test]
    fn recent_form_is_capped_and_ordered() {
        let mut history = Vec::new();
        for day in 1i16..=6 {
            let kind = if day == 6 {
                entry(
                    ParticipationStatus::Joined,
                    false,
                    Some(NoShowReason::Excused),
                )
            } else if day == 5 {
                entry(ParticipationStatus::Left, false, None)
            } else {
                attended_entry()
            };
            let date = date!(2025 - 06 - 01) + Duration::days(i64::from(day));
            history.push((kind, settled_match(i32::from(day), date)));
        }
        // one match still inside the attendance window: excluded
        history.push((attended_entry(), settled_match(7, date!(2025 - 06 - 15))));

        let form = recent_form(&history, NOW);
        assert_eq!(
            form,
            vec![
                FormMark::Present,
                FormMark::Present,
                FormMark::Present,
                FormMark::Absent,
                FormMark::Neutral,
            ]
        );
    }

    #[test]
    fn breakdown_percentages() {
        let history = vec![
            attended_entry(),
            attended_entry(),
            entry(ParticipationStatus::Left, false, None),
            entry(
                ParticipationStatus::Joined,
                false,
                Some(NoShowReason::LastMinute),
            ),
        ];
        let breakdown =
            PlayerBreakdown::new("alex123".to_owned(), Tally::from_history(&history));
        assert_eq!(breakdown.perc_attended, 50.0);
        assert_eq!(breakdown.perc_left, 25.0);
        assert_eq!(breakdown.perc_absent_last_minute, 25.0);
        assert_eq!(breakdown.perc_absent_excused, 0.0);

        let empty = PlayerBreakdown::new("new000".to_owned(), Tally::default());
        assert_eq!(empty.perc_attended, 0.0);
    }
}

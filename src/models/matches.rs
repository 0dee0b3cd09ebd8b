use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime, Time};
use utoipa::ToSchema;

use crate::{
    models::participation::ParticipationStatus,
    schema::{matches, participation},
};

/// Attendance (no-shows, presence) stays editable this long after kick-off.
pub const ATTENDANCE_EDIT_WINDOW: Duration = Duration::hours(24);
/// The match itself (date, capacity, stadium) is frozen this long after kick-off.
pub const MATCH_EDIT_WINDOW: Duration = Duration::minutes(60);

#[derive(Queryable, Selectable, Identifiable, PartialEq, Eq, Debug, Clone, Serialize, ToSchema)]
#[diesel(table_name = matches, check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: i32,
    pub date: Date,
    // utoipa has no ToSchema for time::Time; document the time-of-day as a string.
    #[schema(value_type = Option<String>)]
    pub time: Option<Time>,
    pub stadium_id: i32,
    pub max_players: i32,
    pub share_token: Option<String>,
    #[serde(with = "time::serde::iso8601")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::iso8601")]
    pub updated_at: OffsetDateTime,
}

impl Match {
    /// Kick-off instant. A match without a time counts from midnight, so a
    /// date-only match is "past" as soon as its day starts.
    #[must_use]
    pub fn starts_at(&self) -> OffsetDateTime {
        self.date
            .with_time(self.time.unwrap_or(Time::MIDNIGHT))
            .assume_utc()
    }

    #[must_use]
    pub fn is_past(&self, now: OffsetDateTime) -> bool {
        self.starts_at() < now
    }

    #[must_use]
    pub fn can_edit_attendance(&self, now: OffsetDateTime) -> bool {
        now <= self.starts_at() + ATTENDANCE_EDIT_WINDOW
    }

    #[must_use]
    pub fn can_edit_match(&self, now: OffsetDateTime) -> bool {
        now <= self.starts_at() + MATCH_EDIT_WINDOW
    }

    #[must_use]
    pub fn spots_left(&self, active_count: i64) -> i64 {
        (i64::from(self.max_players) - active_count).max(0)
    }

    /// Counts roster entries that occupy a spot: joined, not removed by an
    /// admin, not marked as a no-show.
    pub async fn count_active_players(&self, conn: &mut AsyncPgConnection) -> QueryResult<i64> {
        participation::table
            .filter(participation::match_id.eq(self.id))
            .filter(participation::status.eq(ParticipationStatus::Joined))
            .filter(participation::removed.eq(false))
            .filter(participation::is_no_show.eq(false))
            .count()
            .get_result(conn)
            .await
    }

    /// Builds the display/permission flags in one round trip.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn summary(&self, conn: &mut AsyncPgConnection) -> QueryResult<MatchSummary> {
        let active_count = self.count_active_players(conn).await?;
        let now = OffsetDateTime::now_utc();
        let spots_left = self.spots_left(active_count);
        Ok(MatchSummary {
            active_player_count: active_count,
            spots_left,
            is_full: spots_left <= 0,
            is_past: self.is_past(now),
            can_edit_attendance: self.can_edit_attendance(now),
            can_edit_match: self.can_edit_match(now),
        })
    }

    pub async fn upcoming(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Self>> {
        matches::table
            .filter(matches::date.ge(OffsetDateTime::now_utc().date()))
            .order((matches::date.asc(), matches::time.asc()))
            .load(conn)
            .await
    }

    /// All matches, latest first, for the admin overview.
    pub async fn all_latest_first(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Self>> {
        matches::table
            .order((matches::date.desc(), matches::time.desc()))
            .load(conn)
            .await
    }

    pub async fn find_by_share_token(
        token: &str,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Option<Self>> {
        matches::table
            .filter(matches::share_token.eq(token))
            .first(conn)
            .await
            .optional()
    }

    /// Raises the capacity, typically as the outcome of the
    /// capacity-negotiation flow when restoring into a full match.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn set_max_players(
        &mut self,
        new_capacity: i32,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<()> {
        self.max_players = new_capacity;
        diesel::update(matches::table.find(self.id))
            .set(matches::max_players.eq(new_capacity))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// # Errors
    /// This fails if the database query fails.
    pub async fn delete(&self, conn: &mut AsyncPgConnection) -> QueryResult<()> {
        diesel::delete(matches::table.find(self.id))
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Derived roster/permission flags. Computed per request, never written back.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub active_player_count: i64,
    pub spots_left: i64,
    pub is_full: bool,
    pub is_past: bool,
    pub can_edit_attendance: bool,
    pub can_edit_match: bool,
}

#[derive(Insertable)]
#[diesel(table_name = matches)]
pub struct NewMatch {
    pub date: Date,
    pub time: Option<Time>,
    pub stadium_id: i32,
    pub max_players: i32,
}

impl NewMatch {
    /// # Errors
    /// This fails if the insert fails, e.g. on an unknown stadium.
    pub async fn create(&self, conn: &mut AsyncPgConnection) -> QueryResult<Match> {
        diesel::insert_into(matches::table)
            .values(self)
            .get_result::<Match>(conn)
            .await
    }
}

/// Partial match edit; `None` fields are left alone.
#[derive(AsChangeset)]
#[diesel(table_name = matches)]
pub struct MatchChangeset {
    pub date: Option<Date>,
    pub time: Option<Time>,
    pub stadium_id: Option<i32>,
    pub max_players: Option<i32>,
}

impl MatchChangeset {
    /// # Errors
    /// This fails if the database query fails.
    pub async fn apply(&self, match_id: i32, conn: &mut AsyncPgConnection) -> QueryResult<Match> {
        diesel::update(matches::table.find(match_id))
            .set(self)
            .get_result::<Match>(conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime, time};

    use super::*;

    fn match_at(date: Date, time: Option<Time>) -> Match {
        Match {
            id: 1,
            date,
            time,
            stadium_id: 1,
            max_players: 10,
            share_token: None,
            created_at: datetime!(2025-01-01 00:00 UTC),
            updated_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    #[test]
    fn edit_windows_extend_past_kickoff() {
        let m = match_at(date!(2025 - 06 - 01), Some(time!(18:00)));

        let just_before = datetime!(2025-06-01 17:59 UTC);
        assert!(!m.is_past(just_before));
        assert!(m.can_edit_match(just_before));
        assert!(m.can_edit_attendance(just_before));

        let within_match_window = datetime!(2025-06-01 18:45 UTC);
        assert!(m.is_past(within_match_window));
        assert!(m.can_edit_match(within_match_window));

        let after_match_window = datetime!(2025-06-01 19:01 UTC);
        assert!(!m.can_edit_match(after_match_window));
        assert!(m.can_edit_attendance(after_match_window));

        let after_attendance_window = datetime!(2025-06-02 18:01 UTC);
        assert!(!m.can_edit_attendance(after_attendance_window));
    }

    #[test]
    fn match_without_time_counts_from_midnight() {
        let m = match_at(date!(2025 - 06 - 01), None);
        assert!(m.is_past(datetime!(2025-06-01 00:01 UTC)));
        assert!(!m.is_past(datetime!(2025-05-31 23:59 UTC)));
    }

    #[test]
    fn spots_left_never_negative() {
        let m = match_at(date!(2025 - 06 - 01), None);
        assert_eq!(m.spots_left(4), 6);
        assert_eq!(m.spots_left(10), 0);
        // overbooked rosters display as full, not as a negative count
        assert_eq!(m.spots_left(11), 0);
    }
}

use diesel::{
    backend::Backend,
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::Pg,
    prelude::*,
    serialize::{self, Output, ToSql},
    sql_types::SmallInt,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

use crate::schema::players;

/// A full license. Deductions count down from here, never above it.
pub const MAX_POINTS: i32 = 15;
/// How long a suspension lasts once points hit zero.
pub const SUSPENSION_LENGTH: Duration = Duration::days(15);
/// Suspensions before the account is permanently disabled.
pub const DISABLING_SUSPENSION_COUNT: i32 = 5;

#[derive(
    AsExpression,
    FromSqlRow,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[diesel(sql_type = SmallInt)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Player = 0,
    Admin = 1,
}

#[derive(
    AsExpression,
    FromSqlRow,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[diesel(sql_type = SmallInt)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum NoShowReason {
    Excused = 0,
    NotExcused = 1,
    LastMinute = 2,
}

impl NoShowReason {
    /// Points taken off the license for this kind of absence.
    #[must_use]
    pub const fn point_deduction(self) -> i32 {
        match self {
            Self::Excused => 0,
            Self::NotExcused => 4,
            Self::LastMinute => 2,
        }
    }

    /// Human-readable form for outcome messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excused => "excused",
            Self::NotExcused => "not excused",
            Self::LastMinute => "last minute",
        }
    }
}

impl ToSql<SmallInt, Pg> for AccountType
where
    i16: ToSql<SmallInt, Pg>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        <i16 as ToSql<SmallInt, Pg>>::to_sql(&v, &mut out.reborrow())
    }
}

impl<DB> FromSql<SmallInt, DB> for AccountType
where
    DB: Backend,
    i16: FromSql<SmallInt, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let type_num = i16::from_sql(bytes)?;
        Ok(Self::try_from(type_num)?)
    }
}

impl ToSql<SmallInt, Pg> for NoShowReason
where
    i16: ToSql<SmallInt, Pg>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        <i16 as ToSql<SmallInt, Pg>>::to_sql(&v, &mut out.reborrow())
    }
}

impl<DB> FromSql<SmallInt, DB> for NoShowReason
where
    DB: Backend,
    i16: FromSql<SmallInt, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let reason_num = i16::from_sql(bytes)?;
        Ok(Self::try_from(reason_num)?)
    }
}

/// Why a player may or may not join matches right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    InactiveOrRecruiter,
    Disabled,
    Suspended,
}

impl Eligibility {
    #[must_use]
    pub const fn can_participate(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

#[derive(Queryable, Selectable, Identifiable, PartialEq, Debug, Clone)]
#[diesel(table_name = players, check_for_backend(diesel::pg::Pg))]
pub struct Player {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub account_type: AccountType,
    pub is_recruiter: bool,
    pub is_disabled: bool,
    pub is_active: bool,
    pub points: i32,
    pub is_suspended: bool,
    pub suspension_until: Option<OffsetDateTime>,
    pub suspension_count: i32,
    pub joined_at: OffsetDateTime,
}

impl Player {
    pub async fn find_by_username(
        name: &str,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Option<Self>> {
        players::table
            .filter(players::username.eq(name))
            .first(conn)
            .await
            .optional()
    }

    /// Clears an expired suspension in place and reinstates the full license.
    ///
    /// Returns whether a reset occurred. Idempotent: once the fields are
    /// cleared, calling it again changes nothing.
    pub fn suspension_expired_at(&mut self, now: OffsetDateTime) -> bool {
        if self.is_suspended && self.suspension_until.is_some_and(|until| until <= now) {
            self.is_suspended = false;
            self.suspension_until = None;
            self.points = MAX_POINTS;
            return true;
        }
        false
    }

    /// Pure eligibility check against the given instant.
    ///
    /// An expired suspension counts as already lifted; use
    /// [`Self::eligibility`] on a request path so the reset is also persisted.
    #[must_use]
    pub fn eligibility_at(&self, now: OffsetDateTime) -> Eligibility {
        if !self.is_active || self.is_recruiter {
            return Eligibility::InactiveOrRecruiter;
        }
        if self.is_disabled {
            return Eligibility::Disabled;
        }
        if self.suspension_until.is_some_and(|until| until > now) {
            return Eligibility::Suspended;
        }
        Eligibility::Eligible
    }

    /// Applies (or reverses) the license outcome of a no-show mark.
    ///
    /// Forward application requires the player to be eligible and is skipped
    /// otherwise; a reversal always goes through. Callers are expected to run
    /// [`Self::suspension_expired_at`] first so points are not deducted from a
    /// standing that should already have been reinstated.
    ///
    /// Returns whether the outcome was applied.
    pub fn apply_no_show_outcome_at(
        &mut self,
        reason: NoShowReason,
        reverse: bool,
        now: OffsetDateTime,
    ) -> bool {
        if !reverse && !self.eligibility_at(now).can_participate() {
            return false;
        }

        let deduction = reason.point_deduction();
        if deduction == 0 {
            // Excused absences leave the license untouched entirely; a player
            // sitting at zero points must not be re-suspended by one.
            return true;
        }

        if reverse {
            self.points += deduction;
        } else {
            self.points -= deduction;
        }

        if self.points <= 0 && !reverse {
            self.points = 0;
            self.is_suspended = true;
            self.suspension_count += 1;
            self.suspension_until = Some(now + SUSPENSION_LENGTH);

            // Repeat offenders get banned outright; the permanent state
            // supersedes the temporary one.
            if self.suspension_count >= DISABLING_SUSPENSION_COUNT {
                self.is_disabled = true;
                self.is_suspended = false;
                self.suspension_until = None;
            }
        }

        if reverse && self.is_suspended && self.points > 0 {
            self.is_suspended = false;
            self.suspension_until = None;
        }

        self.points = self.points.clamp(0, MAX_POINTS);
        true
    }

    /// Checks for an expired suspension and persists the reinstatement.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn check_suspension_expired(
        &mut self,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<bool> {
        if self.suspension_expired_at(OffsetDateTime::now_utc()) {
            self.persist_standing(conn).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Determines whether the player may join matches, lifting an expired
    /// suspension on the way.
    ///
    /// # Errors
    /// This fails if persisting a lifted suspension fails.
    pub async fn eligibility(&mut self, conn: &mut AsyncPgConnection) -> QueryResult<Eligibility> {
        self.check_suspension_expired(conn).await?;
        Ok(self.eligibility_at(OffsetDateTime::now_utc()))
    }

    /// Applies (or reverses) a no-show outcome and persists the standing.
    ///
    /// Returns whether the outcome was applied; a forward application against
    /// an ineligible player is skipped.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn apply_no_show_outcome(
        &mut self,
        reason: NoShowReason,
        reverse: bool,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<bool> {
        let now = OffsetDateTime::now_utc();
        let healed = self.suspension_expired_at(now);
        let applied = self.apply_no_show_outcome_at(reason, reverse, now);
        if healed || applied {
            self.persist_standing(conn).await?;
        }
        Ok(applied)
    }

    /// Administrative disable/enable override. Only touches the disabled flag;
    /// suspension history stays on record.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn set_disabled(
        &mut self,
        disabled: bool,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<()> {
        self.is_disabled = disabled;
        diesel::update(players::table.find(self.id))
            .set(players::is_disabled.eq(self.is_disabled))
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn persist_standing(&self, conn: &mut AsyncPgConnection) -> QueryResult<()> {
        diesel::update(players::table.find(self.id))
            .set((
                players::points.eq(self.points),
                players::is_suspended.eq(self.is_suspended),
                players::suspension_until.eq(self.suspension_until),
                players::suspension_count.eq(self.suspension_count),
                players::is_disabled.eq(self.is_disabled),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Player data safe to embed in tokens and API responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPublic {
    pub id: i32,
    pub username: String,
    pub account_type: AccountType,
    pub is_recruiter: bool,
    #[serde(with = "time::serde::iso8601")]
    pub joined_at: OffsetDateTime,
}

impl PlayerPublic {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.account_type == AccountType::Admin
    }
}

impl From<Player> for PlayerPublic {
    fn from(player: Player) -> Self {
        Self {
            id: player.id,
            username: player.username,
            account_type: player.account_type,
            is_recruiter: player.is_recruiter,
            joined_at: player.joined_at,
        }
    }
}

/// Read-only standing snapshot, for display next to a profile.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StandingSummary {
    pub points: i32,
    pub is_suspended: bool,
    #[serde(with = "time::serde::iso8601::option")]
    pub suspension_until: Option<OffsetDateTime>,
    pub suspension_count: i32,
    pub is_disabled: bool,
}

impl From<&Player> for StandingSummary {
    fn from(player: &Player) -> Self {
        Self {
            points: player.points,
            is_suspended: player.is_suspended,
            suspension_until: player.suspension_until,
            suspension_count: player.suspension_count,
            is_disabled: player.is_disabled,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = players)]
pub struct NewPlayer<'a> {
    pub username: &'a str,
    pub password_hash: String,
}

impl NewPlayer<'_> {
    /// Inserts the player with a fresh standing: full license, no suspension.
    ///
    /// # Errors
    /// This fails if the insert fails, e.g. when the username is taken.
    pub async fn create(&self, conn: &mut AsyncPgConnection) -> QueryResult<Player> {
        diesel::insert_into(players::table)
            .values(self)
            .get_result::<Player>(conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn player_with_points(points: i32) -> Player {
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
            joined_at: datetime!(2025-01-01 12:00 UTC),
        }
    }

    const NOW: OffsetDateTime = datetime!(2025-06-01 18:00 UTC);

    #[test]
    fn three_not_excused_marks_leave_three_points() {
        let mut player = player_with_points(MAX_POINTS);
        for _ in 0..3 {
            assert!(player.apply_no_show_outcome_at(NoShowReason::NotExcused, false, NOW));
        }
        assert_eq!(player.points, 3);
        assert!(!player.is_suspended);
    }

    #[test]
    fn fourth_not_excused_mark_suspends() {
        let mut player = player_with_points(3);
        assert!(player.apply_no_show_outcome_at(NoShowReason::NotExcused, false, NOW));
        assert_eq!(player.points, 0);
        assert!(player.is_suspended);
        assert_eq!(player.suspension_count, 1);
        assert_eq!(player.suspension_until, Some(NOW + SUSPENSION_LENGTH));
    }

    #[test]
    fn forward_application_requires_eligibility() {
        let mut player = player_with_points(10);
        player.is_suspended = true;
        player.suspension_until = Some(NOW + Duration::days(3));
        assert!(!player.apply_no_show_outcome_at(NoShowReason::LastMinute, false, NOW));
        assert_eq!(player.points, 10);
    }

    #[test]
    fn reversal_ignores_eligibility() {
        let mut player = player_with_points(0);
        player.is_suspended = true;
        player.suspension_until = Some(NOW + Duration::days(3));
        assert!(player.apply_no_show_outcome_at(NoShowReason::LastMinute, true, NOW));
        assert_eq!(player.points, 2);
        // points back above zero lifts the suspension early
        assert!(!player.is_suspended);
        assert_eq!(player.suspension_until, None);
    }

    #[test]
    fn reversal_restores_prior_points() {
        let mut player = player_with_points(11);
        player.apply_no_show_outcome_at(NoShowReason::LastMinute, false, NOW);
        assert_eq!(player.points, 9);
        player.apply_no_show_outcome_at(NoShowReason::LastMinute, true, NOW);
        assert_eq!(player.points, 11);
    }

    #[test]
    fn points_stay_clamped() {
        let mut player = player_with_points(1);
        player.apply_no_show_outcome_at(NoShowReason::NotExcused, false, NOW);
        assert_eq!(player.points, 0);

        let mut player = player_with_points(MAX_POINTS);
        player.apply_no_show_outcome_at(NoShowReason::LastMinute, true, NOW);
        assert_eq!(player.points, MAX_POINTS);
    }

    #[test]
    fn excused_never_touches_the_license() {
        let mut player = player_with_points(0);
        assert!(player.apply_no_show_outcome_at(NoShowReason::Excused, false, NOW));
        assert_eq!(player.points, 0);
        assert!(!player.is_suspended);
        assert_eq!(player.suspension_count, 0);
    }

    #[test]
    fn fifth_suspension_disables_permanently() {
        let mut player = player_with_points(1);
        player.suspension_count = DISABLING_SUSPENSION_COUNT - 1;
        player.apply_no_show_outcome_at(NoShowReason::NotExcused, false, NOW);
        assert!(player.is_disabled);
        assert!(!player.is_suspended);
        assert_eq!(player.suspension_until, None);
        assert_eq!(player.suspension_count, DISABLING_SUSPENSION_COUNT);
    }

    #[test]
    fn expired_suspension_reinstates_full_license() {
        let mut player = player_with_points(0);
        player.is_suspended = true;
        player.suspension_until = Some(NOW - Duration::hours(1));
        assert!(player.suspension_expired_at(NOW));
        assert_eq!(player.points, MAX_POINTS);
        assert!(!player.is_suspended);
        assert_eq!(player.suspension_until, None);

        // second run with no time passing is a no-op
        assert!(!player.suspension_expired_at(NOW));
        assert_eq!(player.points, MAX_POINTS);
    }

    #[test]
    fn eligibility_check_order() {
        let mut player = player_with_points(0);
        player.is_recruiter = true;
        player.is_disabled = true;
        player.is_suspended = true;
        player.suspension_until = Some(NOW + Duration::days(1));
        assert_eq!(player.eligibility_at(NOW), Eligibility::InactiveOrRecruiter);

        player.is_recruiter = false;
        assert_eq!(player.eligibility_at(NOW), Eligibility::Disabled);

        player.is_disabled = false;
        assert_eq!(player.eligibility_at(NOW), Eligibility::Suspended);

        player.suspension_until = Some(NOW - Duration::seconds(1));
        assert_eq!(player.eligibility_at(NOW), Eligibility::Eligible);
    }
}

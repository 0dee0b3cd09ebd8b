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
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{
    models::{
        matches::Match,
        players::{NoShowReason, Player},
    },
    schema::{participation, players},
};

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
pub enum ParticipationStatus {
    Joined = 0,
    Left = 1,
}

impl ToSql<SmallInt, Pg> for ParticipationStatus
where
    i16: ToSql<SmallInt, Pg>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        <i16 as ToSql<SmallInt, Pg>>::to_sql(&v, &mut out.reborrow())
    }
}

impl<DB> FromSql<SmallInt, DB> for ParticipationStatus
where
    DB: Backend,
    i16: FromSql<SmallInt, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let status_num = i16::from_sql(bytes)?;
        Ok(Self::try_from(status_num)?)
    }
}

/// What `join` actually did, for the outcome message.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Created,
    Rejoined,
    AlreadyJoined,
}

/// One roster entry per (player, match) pair. A re-join flips the existing
/// row back to joined instead of creating a duplicate.
#[derive(
    Queryable, Selectable, Identifiable, Associations, PartialEq, Eq, Debug, Clone, Serialize,
    ToSchema,
)]
#[diesel(belongs_to(Player))]
#[diesel(belongs_to(Match))]
#[diesel(table_name = participation, check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub id: i32,
    pub player_id: i32,
    pub match_id: i32,
    pub status: ParticipationStatus,
    #[serde(with = "time::serde::iso8601")]
    pub status_time: OffsetDateTime,
    pub removed: bool,
    #[serde(with = "time::serde::iso8601::option")]
    pub removed_time: Option<OffsetDateTime>,
    pub is_no_show: bool,
    pub no_show_reason: Option<NoShowReason>,
    #[serde(with = "time::serde::iso8601::option")]
    pub no_show_time: Option<OffsetDateTime>,
    pub is_present: bool,
}

impl Participation {
    pub async fn find(id: i32, conn: &mut AsyncPgConnection) -> QueryResult<Option<Self>> {
        participation::table.find(id).first(conn).await.optional()
    }

    pub async fn for_player_and_match(
        player_id: i32,
        match_id: i32,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Option<Self>> {
        participation::table
            .filter(participation::player_id.eq(player_id))
            .filter(participation::match_id.eq(match_id))
            .first(conn)
            .await
            .optional()
    }

    /// Full participation history of one player, oldest first.
    pub async fn for_player(
        player_id: i32,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Vec<Self>> {
        participation::table
            .filter(participation::player_id.eq(player_id))
            .order(participation::id.asc())
            .load(conn)
            .await
    }

    /// Roster of a match with the player rows attached.
    pub async fn for_match(
        match_id: i32,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Vec<(Self, Player)>> {
        participation::table
            .inner_join(players::table)
            .filter(participation::match_id.eq(match_id))
            .order(participation::status_time.asc())
            .load::<(Self, Player)>(conn)
            .await
    }

    /// Joins a match: get-or-create the roster entry, flipping a left entry
    /// back to joined. Deliberately does not look at capacity; a roster can
    /// overbook and the display layer shows the match as full.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn join(
        player_id: i32,
        match_id: i32,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<(Self, JoinOutcome)> {
        let existing = Self::for_player_and_match(player_id, match_id, conn).await?;

        match existing {
            None => {
                let created = diesel::insert_into(participation::table)
                    .values(NewParticipation {
                        player_id,
                        match_id,
                        status: ParticipationStatus::Joined,
                    })
                    .get_result::<Self>(conn)
                    .await?;
                Ok((created, JoinOutcome::Created))
            }
            Some(mut entry) if entry.status == ParticipationStatus::Left => {
                entry.set_status(ParticipationStatus::Joined, conn).await?;
                Ok((entry, JoinOutcome::Rejoined))
            }
            Some(entry) => Ok((entry, JoinOutcome::AlreadyJoined)),
        }
    }

    /// Leaves a match. A player who never joined is silently ignored.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn leave(
        player_id: i32,
        match_id: i32,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Option<Self>> {
        let existing = Self::for_player_and_match(player_id, match_id, conn).await?;

        match existing {
            None => Ok(None),
            Some(mut entry) => {
                if entry.status != ParticipationStatus::Left {
                    entry.set_status(ParticipationStatus::Left, conn).await?;
                }
                Ok(Some(entry))
            }
        }
    }

    async fn set_status(
        &mut self,
        status: ParticipationStatus,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<()> {
        self.status = status;
        self.status_time = OffsetDateTime::now_utc();
        diesel::update(participation::table.find(self.id))
            .set((
                participation::status.eq(self.status),
                participation::status_time.eq(self.status_time),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Marks the entry as a no-show and applies the license outcome to the
    /// player. Returns whether the license was actually touched (a player who
    /// is already ineligible only gets the attendance mark).
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn mark_no_show(
        &mut self,
        player: &mut Player,
        reason: NoShowReason,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<bool> {
        self.is_no_show = true;
        self.no_show_reason = Some(reason);
        self.no_show_time = Some(OffsetDateTime::now_utc());
        diesel::update(participation::table.find(self.id))
            .set((
                participation::is_no_show.eq(true),
                participation::no_show_reason.eq(self.no_show_reason),
                participation::no_show_time.eq(self.no_show_time),
            ))
            .execute(conn)
            .await?;

        player.apply_no_show_outcome(reason, false, conn).await
    }

    /// Undoes a mistaken no-show mark, reversing the license deduction.
    /// Returns the reason that was cleared, or `None` when the entry was not
    /// marked in the first place (a no-op, not an error).
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn clear_no_show(
        &mut self,
        player: &mut Player,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Option<NoShowReason>> {
        if !self.is_no_show {
            return Ok(None);
        }
        let reason = self.no_show_reason;

        self.is_no_show = false;
        self.no_show_reason = None;
        self.no_show_time = None;
        diesel::update(participation::table.find(self.id))
            .set((
                participation::is_no_show.eq(false),
                participation::no_show_reason.eq(None::<NoShowReason>),
                participation::no_show_time.eq(None::<OffsetDateTime>),
            ))
            .execute(conn)
            .await?;

        if let Some(reason) = reason {
            player.apply_no_show_outcome(reason, true, conn).await?;
        }
        Ok(reason)
    }

    /// Admin soft delete. Status and its timestamp are intentionally left
    /// alone so the join/leave history stays auditable.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn remove(&mut self, conn: &mut AsyncPgConnection) -> QueryResult<()> {
        self.removed = true;
        self.removed_time = Some(OffsetDateTime::now_utc());
        diesel::update(participation::table.find(self.id))
            .set((
                participation::removed.eq(true),
                participation::removed_time.eq(self.removed_time),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Undoes a soft delete. Capacity is negotiated by the caller before this
    /// runs; the entry itself restores unconditionally.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn restore(&mut self, conn: &mut AsyncPgConnection) -> QueryResult<()> {
        self.removed = false;
        self.removed_time = None;
        diesel::update(participation::table.find(self.id))
            .set((
                participation::removed.eq(false),
                participation::removed_time.eq(None::<OffsetDateTime>),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Physical attendance flag, independent of the no-show classification.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn set_present(
        &mut self,
        present: bool,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<()> {
        self.is_present = present;
        diesel::update(participation::table.find(self.id))
            .set(participation::is_present.eq(present))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Permanently deletes the entry. Irreversible; the API requires an
    /// explicit confirmation flag before calling this.
    ///
    /// # Errors
    /// This fails if the database query fails.
    pub async fn hard_delete(self, conn: &mut AsyncPgConnection) -> QueryResult<()> {
        diesel::delete(participation::table.find(self.id))
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[derive(Insertable)]
#[diesel(table_name = participation)]
pub struct NewParticipation {
    pub player_id: i32,
    pub match_id: i32,
    pub status: ParticipationStatus,
}

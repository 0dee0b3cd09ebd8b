use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::schema::stadiums;

/// A place where matches happen. The maps embed URL is stored exactly as the
/// admin pasted it; expanding short links is the frontend's problem.
#[derive(Queryable, Selectable, Identifiable, PartialEq, Eq, Debug, Clone, Serialize, ToSchema)]
#[diesel(table_name = stadiums, check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Stadium {
    pub id: i32,
    pub name: String,
    pub maps_embed_url: Option<String>,
    #[serde(with = "time::serde::iso8601")]
    pub created_at: OffsetDateTime,
}

impl Stadium {
    pub async fn all(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Self>> {
        stadiums::table.order(stadiums::name.asc()).load(conn).await
    }
}

#[derive(Insertable)]
#[diesel(table_name = stadiums)]
pub struct NewStadium<'a> {
    pub name: &'a str,
    pub maps_embed_url: Option<&'a str>,
}

impl NewStadium<'_> {
    /// # Errors
    /// This fails if the insert fails.
    pub async fn create(&self, conn: &mut AsyncPgConnection) -> QueryResult<Stadium> {
        diesel::insert_into(stadiums::table)
            .values(self)
            .get_result::<Stadium>(conn)
            .await
    }
}

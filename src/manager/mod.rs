use clap::{Parser, Subcommand, ValueEnum};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::{distr::Alphanumeric, Rng};
use tracing::{info, instrument};

use crate::{models::players::AccountType, AppState};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Assign share tokens to matches that don't have one yet.
    /// Safe to re-run; existing tokens are left alone.
    BackfillShareTokens,
    /// Change a player's account tier (e.g. to bootstrap the first admin).
    SetAccountType {
        username: String,
        #[clap(value_enum)]
        account_type: CliAccountType,
    },
    DeleteMatch {
        id_to_delete: i32,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliAccountType {
    Player,
    Admin,
}

impl From<CliAccountType> for AccountType {
    fn from(cli: CliAccountType) -> Self {
        match cli {
            CliAccountType::Player => Self::Player,
            CliAccountType::Admin => Self::Admin,
        }
    }
}

fn new_share_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

//skip state because it has members that don't implement Debug
#[instrument(name = "cli_command", skip(state))]
pub async fn parse_command(command: &Command, state: AppState) -> anyhow::Result<()> {
    match command {
        Command::BackfillShareTokens => {
            use crate::schema::matches::dsl::*;

            let mut conn = state.db.get().await?;

            let missing: Vec<i32> = matches
                .filter(share_token.is_null())
                .select(id)
                .load(&mut conn)
                .await?;
            let count = missing.len();
            for match_id in missing {
                diesel::update(matches.find(match_id))
                    .set(share_token.eq(new_share_token()))
                    .execute(&mut conn)
                    .await?;
            }

            info!("Assigned share tokens to {count} match(es)");
            Ok(())
        }
        Command::SetAccountType {
            username,
            account_type,
        } => {
            use crate::schema::players;

            let mut conn = state.db.get().await?;

            let updated = diesel::update(players::table.filter(players::username.eq(username)))
                .set(players::account_type.eq(AccountType::from(*account_type)))
                .execute(&mut conn)
                .await?;
            anyhow::ensure!(updated == 1, "no player named {username}");

            info!("{username} is now a {account_type:?}");
            Ok(())
        }
        Command::DeleteMatch { id_to_delete } => {
            use crate::schema::matches::dsl::*;

            let mut conn = state.db.get().await?;

            let deleted = diesel::delete(matches.find(*id_to_delete))
                .execute(&mut conn)
                .await?;
            anyhow::ensure!(deleted == 1, "no match with id {id_to_delete}");

            info!("Deleted match {id_to_delete}");
            Ok(())
        }
    }
}

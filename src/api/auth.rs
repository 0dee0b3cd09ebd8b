use std::sync::LazyLock;

use axum::{extract::State, Json};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use validator::Validate;

use crate::{
    models::players::{NewPlayer, Player, PlayerPublic},
    util::{
        errors::{RouteError, SimpleRouteErrorOutput},
        jwt::{AuthBody, Claims},
    },
    AppState,
};

// Same username shape the league has always enforced: a name followed by
// exactly three digits, e.g. "alex123".
static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+[0-9]{3}$").expect("username regex should compile"));

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(signup))
        .routes(routes!(login))
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
struct SignupRequest {
    #[validate(
        regex(
            path = *USERNAME_REGEX,
            message = "Username must be letters followed by exactly 3 digits (e.g. alex123)"
        ),
        length(max = 32)
    )]
    username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    profile: PlayerPublic,
    #[serde(flatten)]
    auth: AuthBody,
}

/// Sign up a new player
///
/// Creates the account with a fresh standing and returns a token.
#[utoipa::path(
    method(post),
    path = "/signup",
    request_body = SignupRequest,
    responses(
        (status = OK, description = "Success", body = AuthResponse, content_type = "application/json"),
        (status = BAD_REQUEST, description = "Invalid username or password shape", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = CONFLICT, description = "Username already taken", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<AuthResponse>, RouteError> {
    payload.validate().map_err(|e| {
        let message = format!("Signup validation error: [{e}]").replace('\n', ", ");
        RouteError::new_bad_request().set_public_error_message(&message)
    })?;

    let mut conn = state.db.get().await?;

    let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)?;
    let player = NewPlayer {
        username: &payload.username,
        password_hash,
    }
    .create(&mut conn)
    .await
    .map_err(|e| match e {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => RouteError::new_conflict().set_public_error_message("Username is already taken"),
        other => other.into(),
    })?;

    let profile = PlayerPublic::from(player);
    let token = Claims::issue_token(profile.clone(), &state.jwt_keys)?;

    Ok(Json(AuthResponse {
        profile,
        auth: AuthBody::new(token),
    }))
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    username: String,
    password: String,
}

/// Log in
#[utoipa::path(
    method(post),
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = OK, description = "Success", body = AuthResponse, content_type = "application/json"),
        (status = UNAUTHORIZED, description = "Bad credentials", body = SimpleRouteErrorOutput, content_type = "application/json"),
        (status = INTERNAL_SERVER_ERROR, description = "Miscellaneous error", body = SimpleRouteErrorOutput)
    )
)]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, RouteError> {
    let mut conn = state.db.get().await?;

    let bad_credentials = || {
        RouteError::new_unauthorized().set_public_error_message("Invalid username or password")
    };

    let player = Player::find_by_username(&payload.username, &mut conn)
        .await?
        .ok_or_else(bad_credentials)?;

    if !bcrypt::verify(&payload.password, &player.password_hash)? {
        return Err(bad_credentials());
    }

    let profile = PlayerPublic::from(player);
    let token = Claims::issue_token(profile.clone(), &state.jwt_keys)?;

    Ok(Json(AuthResponse {
        profile,
        auth: AuthBody::new(token),
    }))
}

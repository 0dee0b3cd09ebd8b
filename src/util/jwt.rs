use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    RequestPartsExt,
};
use axum_extra::{
    extract::CookieJar,
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

use super::errors::{IntoRouteError, RouteError};
use crate::{models::players::PlayerPublic, AppState};

#[derive(Clone)]
pub struct Keys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthBody {
    access_token: String,
    token_type: String,
}

impl AuthBody {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub profile: PlayerPublic,
    pub exp: i64,
}

impl Claims {
    /// Issues a token valid for 30 days.
    pub fn issue_token(profile: PlayerPublic, keys: &Keys) -> Result<String, RouteError> {
        let claims = Self {
            profile,
            exp: (OffsetDateTime::now_utc() + Duration::days(30)).unix_timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &keys.encoding)?)
    }

    /// Rejects everyone below the admin account tier.
    pub fn require_admin(&self) -> Result<(), RouteError> {
        if self.profile.is_admin() {
            Ok(())
        } else {
            Err(RouteError::new_forbidden()
                .set_public_error_message("This action requires an admin account"))
        }
    }
}

impl<S> FromRequestParts<S> for Claims
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = RouteError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        // Extract the token from the authorization header, if it's not there, try the cookie
        let token = match parts.extract::<TypedHeader<Authorization<Bearer>>>().await {
            Ok(bearer) => bearer.token().to_owned(),
            Err(_) => {
                let jar = parts
                    .extract::<CookieJar>()
                    .await
                    .http_status_error(StatusCode::UNAUTHORIZED)?;

                jar.get("authorization")
                    .map(|cookie| cookie.value().to_owned().replace("Bearer ", ""))
                    .ok_or_else(|| anyhow::anyhow!("No token found"))
                    .http_error("No token found", StatusCode::UNAUTHORIZED)?
            }
        };

        // Decode the user data
        let token_data = decode::<Self>(&token, &state.jwt_keys.decoding, &Validation::default())
            .http_error("Invalid token", StatusCode::UNAUTHORIZED)?;

        Ok(token_data.claims)
    }
}

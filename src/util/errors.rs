use axum::{
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// Error type for all API routes.
///
/// Carries an HTTP status and a message that is safe to show to the client.
/// The underlying cause (if any) is logged, never serialized.
#[derive(Error, Debug)]
#[error("route error with status {status}: {public_message}")]
pub struct RouteError {
    status: StatusCode,
    public_message: String,
    source: Option<anyhow::Error>,
}

/// What an error response actually looks like on the wire.
#[derive(serde::Serialize, ToSchema)]
pub struct SimpleRouteErrorOutput {
    pub error: String,
}

impl RouteError {
    #[must_use]
    pub fn new_bad_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            public_message: "Invalid request".to_owned(),
            source: None,
        }
    }

    #[must_use]
    pub fn new_unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            public_message: "Unauthorized".to_owned(),
            source: None,
        }
    }

    #[must_use]
    pub fn new_forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            public_message: "Forbidden".to_owned(),
            source: None,
        }
    }

    #[must_use]
    pub fn new_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            public_message: "Not found".to_owned(),
            source: None,
        }
    }

    #[must_use]
    pub fn new_conflict() -> Self {
        Self {
            status: StatusCode::CONFLICT,
            public_message: "Conflict".to_owned(),
            source: None,
        }
    }

    /// Sets the message shown to the client.
    #[must_use]
    pub fn set_public_error_message(mut self, message: &str) -> Self {
        self.public_message = message.to_owned();
        self
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("route error: {:?}", self.source);
        }
        (
            self.status,
            Json(json!({ "error": self.public_message })),
        )
            .into_response()
    }
}

/// Attaches HTTP semantics to arbitrary `Result`s, wrapping the failure
/// with a client-safe message.
pub trait IntoRouteError<T> {
    fn http_error(self, message: &str, status: StatusCode) -> Result<T, RouteError>;

    fn http_status_error(self, status: StatusCode) -> Result<T, RouteError>;

    fn http_internal_error(self, message: &str) -> Result<T, RouteError>
    where
        Self: Sized,
    {
        self.http_error(message, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl<T, E> IntoRouteError<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn http_error(self, message: &str, status: StatusCode) -> Result<T, RouteError> {
        self.map_err(|err| RouteError {
            status,
            public_message: message.to_owned(),
            source: Some(err.into()),
        })
    }

    fn http_status_error(self, status: StatusCode) -> Result<T, RouteError> {
        self.map_err(|err| RouteError {
            status,
            public_message: status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_owned(),
            source: Some(err.into()),
        })
    }
}

impl From<anyhow::Error> for RouteError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            public_message: "Internal server error".to_owned(),
            source: Some(err),
        }
    }
}

impl From<diesel::result::Error> for RouteError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::new_not_found(),
            _ => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                public_message: "Database error".to_owned(),
                source: Some(err.into()),
            },
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for RouteError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            public_message: "Database error".to_owned(),
            source: Some(err.into()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for RouteError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            public_message: "Invalid token".to_owned(),
            source: Some(err.into()),
        }
    }
}

impl From<bcrypt::BcryptError> for RouteError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            public_message: "Internal server error".to_owned(),
            source: Some(err.into()),
        }
    }
}

impl From<FormRejection> for RouteError {
    fn from(err: FormRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            public_message: err.body_text(),
            source: None,
        }
    }
}

impl From<JsonRejection> for RouteError {
    fn from(err: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            public_message: err.body_text(),
            source: None,
        }
    }
}

impl From<QueryRejection> for RouteError {
    fn from(err: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            public_message: err.body_text(),
            source: None,
        }
    }
}

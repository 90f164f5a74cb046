use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

/// Failures caused by the caller rather than the server.
#[derive(Debug, Error)]
pub enum Reject {
    #[error("not logged in")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    BadRequest(&'static str),
}

impl Reject {
    pub fn status(&self) -> StatusCode {
        use Reject::*;
        match self {
            Unauthorized => StatusCode::UNAUTHORIZED,
            Forbidden(_) => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            Conflict(_) => StatusCode::CONFLICT,
            BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl AppError {
    pub fn reject(&self) -> Option<&Reject> {
        self.0.downcast_ref::<Reject>()
    }

    pub fn status(&self) -> StatusCode {
        self.reject()
            .map(Reject::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(reject) = self.reject() {
            return (reject.status(), reject.to_string()).into_response();
        }

        tracing::error!("{:#}\n{}", self.0, self.0.backtrace());
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}", self.0),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(Reject);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(jsonwebtoken::errors::Error);
apperr_impl!(uuid::Error);
apperr_impl!(oauth2::url::ParseError);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keep_their_status() {
        let err = AppError::from(Reject::Forbidden("only the owner may delete the room"));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = AppError::from(Reject::NotFound("room"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.0.to_string(), "room not found");
    }

    #[test]
    fn other_errors_are_internal() {
        let err = AppError::from("database on fire");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.reject().is_none());
    }
}

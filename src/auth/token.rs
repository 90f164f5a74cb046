use std::{sync::Arc, time::Duration};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::{Cookie, SameSite};
use uuid::Uuid;

use crate::{AppError, Reject, session::TOKEN_COOKIE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: u64,
}

#[derive(Clone)]
pub struct TokenKeys(Arc<Keys>);

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self(Arc::new(Keys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }))
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = jsonwebtoken::get_current_timestamp() + self.0.ttl.as_secs();
        let claims = Claims { sub: user_id, email: email.to_owned(), exp };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.0.encoding)
    }

    pub(crate) fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.0.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((TOKEN_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.0.ttl.as_secs() as i64))
            .build()
    }
}

pub fn expired_cookie() -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Finds the `token` cookie among every `Cookie` header.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}

/// The authenticated caller, taken from the signed `token` cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    TokenKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = TokenKeys::from_ref(state);
        let token = token_from_headers(&parts.headers).ok_or(Reject::Unauthorized)?;
        let claims = keys.verify(&token).map_err(|e| {
            tracing::debug!("rejected token: {e}");
            Reject::Unauthorized
        })?;

        Ok(CurrentUser { id: claims.sub, email: claims.email })
    }
}

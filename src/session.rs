//! Keys shared between handlers for session values and cookies.

pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

pub const TOKEN_COOKIE: &str = "token";

pub mod password;
pub mod registration;
pub mod session;

pub use password::{recovery_password, recovery_session, request_password_reset};
pub use registration::{confirm_callback, oauth_start, register};
pub use session::{login, login_screen, logout};

use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::services::{provider::ProviderSession, session::SessionCookie};

/// Build a session-carrying cookie. HttpOnly and Lax throughout; the token
/// pair never needs to be readable by page scripts.
pub(crate) fn session_cookie(
    name: &'static str,
    path: &'static str,
    session: &ProviderSession,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, SessionCookie::from_session(session).encode()))
        .path(path)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Removal cookie. The path must match the one the cookie was set with or
/// the browser keeps the original.
pub(crate) fn removal_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path(path).build()
}

pub(crate) fn decode_cookie(
    jar: &axum_extra::extract::CookieJar,
    name: &str,
) -> Option<SessionCookie> {
    jar.get(name).and_then(|c| SessionCookie::decode(c.value()))
}

//! Auth cookies: httpOnly, `SameSite=Lax`, path `/`.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oz_core::auth::{AuthConfig, IssuedTokens};
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

fn auth_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Build a httpOnly cookie for the access token.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    auth_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Build a httpOnly cookie for the refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    auth_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Add both token cookies to `jar`.
pub fn set_token_cookies(jar: CookieJar, tokens: &IssuedTokens, config: &AuthConfig) -> CookieJar {
    jar.add(access_cookie(
        &tokens.access_token,
        tokens.access_ttl_secs,
        config.secure_cookies,
    ))
    .add(refresh_cookie(
        &tokens.refresh_token,
        tokens.refresh_ttl_secs,
        config.secure_cookies,
    ))
}

/// Overwrite both token cookies with expired, empty values.
pub fn clear_token_cookies(jar: CookieJar, config: &AuthConfig) -> CookieJar {
    jar.add(auth_cookie(
        ACCESS_COOKIE,
        String::new(),
        Duration::ZERO,
        config.secure_cookies,
    ))
    .add(auth_cookie(
        REFRESH_COOKIE,
        String::new(),
        Duration::ZERO,
        config.secure_cookies,
    ))
}

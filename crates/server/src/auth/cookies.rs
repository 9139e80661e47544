use axum_extra::extract::cookie::{Cookie, SameSite};
use std::time::Duration as StdDuration;
use time::Duration;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// The refresh cookie is only sent to the auth endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";
const ACCESS_COOKIE_PATH: &str = "/";

fn token_cookie(
    name: &'static str,
    value: &str,
    path: &'static str,
    ttl: StdDuration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(path)
        .max_age(Duration::seconds(ttl.as_secs() as i64))
        .build()
}

pub fn access_token_cookie(token: &str, ttl: StdDuration, secure: bool) -> Cookie<'static> {
    token_cookie(ACCESS_TOKEN_COOKIE, token, ACCESS_COOKIE_PATH, ttl, secure)
}

pub fn refresh_token_cookie(token: &str, ttl: StdDuration, secure: bool) -> Cookie<'static> {
    token_cookie(REFRESH_TOKEN_COOKIE, token, REFRESH_COOKIE_PATH, ttl, secure)
}

/// Removal cookies for both session tokens.
pub fn cleared_cookies() -> [Cookie<'static>; 2] {
    [
        Cookie::build((ACCESS_TOKEN_COOKIE, ""))
            .path(ACCESS_COOKIE_PATH)
            .max_age(Duration::ZERO)
            .build(),
        Cookie::build((REFRESH_TOKEN_COOKIE, ""))
            .path(REFRESH_COOKIE_PATH)
            .max_age(Duration::ZERO)
            .build(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let access = access_token_cookie("abc", StdDuration::from_secs(86400), true);
        assert_eq!(access.name(), "accessToken");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Strict));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.max_age(), Some(Duration::hours(24)));

        let refresh = refresh_token_cookie("def", StdDuration::from_secs(90 * 86400), true);
        assert_eq!(refresh.path(), Some(REFRESH_COOKIE_PATH));
        assert_eq!(refresh.max_age(), Some(Duration::days(90)));
    }
}

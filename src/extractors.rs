use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::feed::UserId;
use crate::state::AppState;

/// Represents the currently authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub token: String,
}

/// Extractor that requires authentication.
/// Returns 401 if no live session found.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let id = state
            .identity
            .current_user_id(&token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser { id, token })
    }
}

/// Optional user extractor, returns None instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// Bearer token first, then the session cookie
fn extract_session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|s| s.split(';'))
            .map(|s| s.trim())
            .find_map(|cookie| {
                let mut split = cookie.splitn(2, '=');
                let key = split.next()?.trim();
                let val = split.next()?.trim();
                if key == cookie_name {
                    Some(val)
                } else {
                    None
                }
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_is_extracted() {
        let p = parts(&[("authorization", "Bearer abc123")]);
        assert_eq!(extract_session_token(&p, "likeboard_session"), Some("abc123"));
    }

    #[test]
    fn cookie_token_is_extracted() {
        let p = parts(&[("cookie", "theme=dark; likeboard_session=tok; other=1")]);
        assert_eq!(extract_session_token(&p, "likeboard_session"), Some("tok"));
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let p = parts(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "likeboard_session=from-cookie"),
        ]);
        assert_eq!(
            extract_session_token(&p, "likeboard_session"),
            Some("from-header")
        );
    }

    #[test]
    fn missing_token_is_none() {
        let p = parts(&[("cookie", "theme=dark"), ("authorization", "Basic xyz")]);
        assert_eq!(extract_session_token(&p, "likeboard_session"), None);
    }
}

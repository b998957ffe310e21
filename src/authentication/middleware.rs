use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use crate::{
    config::Config,
    error::{Error, HtmlError},
};

use super::jwt::{verify_jwt_session, SessionData};

/// Extracts the token of an `Authorization: Token <jwt>` (or `Bearer <jwt>`) header.
fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    match scheme {
        "Token" | "Bearer" if !token.is_empty() => Some(token),
        _ => None,
    }
}

fn session_from_header(header: Option<&str>, config: &Config) -> Result<SessionData, Error> {
    let token = header
        .and_then(parse_authorization)
        .ok_or_else(|| HtmlError::Unauthorized.default())?;

    verify_jwt_session(token, &config.jwt_secret).map(SessionData::from)
}

pub fn with_session(
    config: Arc<Config>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let config = config.clone();
        async move {
            session_from_header(header.as_deref(), &config).map_err(|e| {
                log::trace!("> Rejected session: {}", e.message());
                warp::reject::custom(e)
            })
        }
    })
}

/// Anonymous when the header is missing or the token does not verify.
pub fn with_possible_session(
    config: Arc<Config>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").map(move |header: Option<String>| {
        session_from_header(header.as_deref(), &config).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        jwt::{sign_session, JwtSessionData},
        schema::UserRole,
    };

    fn config() -> Arc<Config> {
        let mut config =
            Config::from_vars(|key| (key == "DATABASE_URL").then(|| "postgres://test".to_owned()))
                .unwrap();
        config.jwt_secret = "middleware-secret".to_owned();
        Arc::new(config)
    }

    fn token(config: &Config) -> String {
        let claims = JwtSessionData::new(7, "cook".to_owned(), UserRole::User, 1);
        sign_session(&claims, &config.jwt_secret).unwrap()
    }

    #[test]
    fn authorization_schemes() {
        assert_eq!(parse_authorization("Token abc"), Some("abc"));
        assert_eq!(parse_authorization("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Token "), None);
        assert_eq!(parse_authorization("abc"), None);
    }

    #[tokio::test]
    async fn valid_tokens_yield_a_session() {
        let config = config();
        let session = warp::test::request()
            .header("authorization", format!("Token {}", token(&config)))
            .filter(&with_session(config.clone()))
            .await
            .unwrap();
        assert_eq!(session.user_id, 7);
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let config = config();
        let result = warp::test::request()
            .filter(&with_session(config))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_tokens_are_anonymous() {
        let config = config();
        let session = warp::test::request()
            .header("authorization", "Token garbage")
            .filter(&with_possible_session(config.clone()))
            .await
            .unwrap();
        assert!(session.is_none());

        let session = warp::test::request()
            .header("authorization", format!("Bearer {}", token(&config)))
            .filter(&with_possible_session(config))
            .await
            .unwrap();
        assert_eq!(session.map(|s| s.username), Some("cook".to_owned()));
    }
}

use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::{Id, User, UserRole};
use crate::error::{Error, HtmlError};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, lifetime_hours: i64) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(lifetime_hours)).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(HtmlError::Forbidden.default());
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
        }
    }
}

fn signing_key(secret: &str) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(secret.as_bytes()).map_err(|_| {
        log::error!("> Rejected JWT signing key");
        HtmlError::InternalServerError.default()
    })
}

pub fn sign_session(claims: &JwtSessionData, secret: &str) -> Result<String, Error> {
    let key = signing_key(secret)?;

    claims.sign_with_key(&key).map_err(|e| {
        log::error!("> Failed to sign session: {e}");
        HtmlError::InternalServerError.default()
    })
}

pub fn generate_jwt_session(user: &User, secret: &str, lifetime_hours: i64) -> Result<String, Error> {
    let claims = JwtSessionData::new(
        user.id,
        user.username.to_owned(),
        user.role.to_owned(),
        lifetime_hours,
    );

    sign_session(&claims, secret)
}

pub fn verify_jwt_session(token: &str, secret: &str) -> Result<JwtSessionData, Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| HtmlError::InvalidSession.new("Invalid session; Invalid token"))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(HtmlError::InvalidSession.new("Invalid session; Token expired"));
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn signed_sessions_verify() {
        let claims = JwtSessionData::new(4, "chef".to_owned(), UserRole::User, 1);
        let token = sign_session(&claims, SECRET).unwrap();

        let session: SessionData = verify_jwt_session(&token, SECRET).unwrap().into();
        assert_eq!(session.user_id, 4);
        assert_eq!(session.username, "chef");
        assert!(!session.is_admin);
    }

    #[test]
    fn foreign_signatures_are_rejected() {
        let claims = JwtSessionData::new(4, "chef".to_owned(), UserRole::User, 1);
        let token = sign_session(&claims, "another-secret").unwrap();

        let error = verify_jwt_session(&token, SECRET).unwrap_err();
        assert_eq!(error.kind, HtmlError::InvalidSession);
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let claims = JwtSessionData::new(4, "chef".to_owned(), UserRole::Admin, -1);
        let token = sign_session(&claims, SECRET).unwrap();

        let error = verify_jwt_session(&token, SECRET).unwrap_err();
        assert_eq!(error.message(), "Invalid session; Token expired");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify_jwt_session("not.a.token", SECRET).is_err());
    }
}

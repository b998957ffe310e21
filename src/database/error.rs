use std::fmt::{self, Display};

use warp::{http::StatusCode, reject::Reject};

/// Error categories surfaced by the API, each bound to one HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HtmlError {
    InvalidRequest,
    Conflict,
    Unauthorized,
    InvalidSession,
    Forbidden,
    NotFound,
    InternalServerError,
}

impl HtmlError {
    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: Some(info.to_owned()),
        }
    }

    pub fn default(self) -> Error {
        Error {
            kind: self,
            info: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HtmlError::InvalidRequest | HtmlError::Conflict => StatusCode::BAD_REQUEST,
            HtmlError::Unauthorized | HtmlError::InvalidSession => StatusCode::UNAUTHORIZED,
            HtmlError::Forbidden => StatusCode::FORBIDDEN,
            HtmlError::NotFound => StatusCode::NOT_FOUND,
            HtmlError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            HtmlError::InvalidRequest => "Invalid request",
            HtmlError::Conflict => "Already exists",
            HtmlError::Unauthorized => "Authentication credentials were not provided",
            HtmlError::InvalidSession => "Invalid session",
            HtmlError::Forbidden => "You don't have permission to perform this action",
            HtmlError::NotFound => "Not found",
            HtmlError::InternalServerError => "Internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: HtmlError,
    pub info: Option<String>,
}

impl Error {
    pub fn code(&self) -> u16 {
        self.kind.status().as_u16()
    }

    pub fn message(&self) -> String {
        self.info
            .clone()
            .unwrap_or_else(|| self.kind.default_message().to_owned())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl std::error::Error for Error {}
impl Reject for Error {}

pub struct QueryError {
    info: String,
    conflict: bool,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            conflict: false,
        }
    }

    /// Replaces the message of a uniqueness violation with one meant for the client.
    pub fn on_conflict(mut self, info: &str) -> Self {
        if self.conflict {
            self.info = info.to_owned();
        }
        self
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) if e.is_unique_violation() => Self {
                info: format!("{e}"),
                conflict: true,
            },
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(e),
            sqlx::Error::RowNotFound => Self::new("RowNotFound".to_owned()),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(e),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new("Pool timed out".to_owned()),
            sqlx::Error::PoolClosed => Self::new("Pool closed".to_owned()),
            sqlx::Error::WorkerCrashed => Self::new("Worker crashed".to_owned()),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new("Unknown error".to_owned()),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        if value.conflict {
            log::warn!("> Rejected duplicate write: {}", value.info);
            return HtmlError::Conflict.new(&value.info);
        }

        log::error!("> Query failed: {}", value.info);
        HtmlError::InternalServerError.default()
    }
}

pub struct CacheError {
    info: String,
    malformed: bool,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
            malformed: value.kind() == redis::ErrorKind::TypeError,
        }
    }
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            malformed: false,
        }
    }

    /// The stored value could not be decoded into the requested type.
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}

impl From<CacheError> for Error {
    fn from(value: CacheError) -> Self {
        log::error!("> Cache failed: {}", value.info);
        HtmlError::InternalServerError.default()
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        HtmlError::InvalidRequest.new(&value.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(HtmlError::InvalidRequest.default().code(), 400);
        assert_eq!(HtmlError::Conflict.default().code(), 400);
        assert_eq!(HtmlError::Unauthorized.default().code(), 401);
        assert_eq!(HtmlError::Forbidden.default().code(), 403);
        assert_eq!(HtmlError::NotFound.default().code(), 404);
        assert_eq!(HtmlError::InternalServerError.default().code(), 500);
    }

    #[test]
    fn message_falls_back_to_kind_default() {
        assert_eq!(HtmlError::NotFound.default().message(), "Not found");
        assert_eq!(
            HtmlError::NotFound.new("No recipe with this id").message(),
            "No recipe with this id"
        );
    }

    #[test]
    fn plain_query_errors_are_internal() {
        let error: Error = QueryError::from(sqlx::Error::PoolTimedOut)
            .on_conflict("ignored")
            .into();
        assert_eq!(error.kind, HtmlError::InternalServerError);
        assert_eq!(error.info, None);
    }

    #[test]
    fn type_errors_are_bad_requests() {
        let error: Error = TypeError::new("Invalid key").into();
        assert_eq!(error.kind, HtmlError::InvalidRequest);
        assert_eq!(error.message(), "Invalid key");
    }

    #[test]
    fn errors_become_rejections_through_reject() {
        let rejection: warp::Rejection = HtmlError::Forbidden.new("Not yours").into();
        let error = rejection.find::<Error>().unwrap();
        assert_eq!(error.kind, HtmlError::Forbidden);
        assert_eq!(error.message(), "Not yours");
    }
}

use axum::extract::rejection::JsonRejection;
use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

const LOCK_NOT_AVAILABLE: &str = "55P03";
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

// primary key of the settlement ledger
const SETTLEMENTS_KEY: &str = "settlements_pkey";

#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        Error::env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return Error::not_found_error("record");
        }

        let (state, constraint) = match &err {
            sqlx::Error::Database(db_err) => (
                db_err.code().map(|code| code.into_owned()),
                db_err.constraint().map(str::to_owned),
            ),
            _ => (None, None),
        };

        match (state.as_deref(), constraint.as_deref()) {
            (Some(LOCK_NOT_AVAILABLE), _)
            | (Some(SERIALIZATION_FAILURE), _)
            | (Some(DEADLOCK_DETECTED), _) => {
                Error::conflict_error("load is being modified by another request")
            }
            (Some(UNIQUE_VIOLATION), Some(SETTLEMENTS_KEY)) => {
                Error::conflict_error("load has already been settled")
            }
            (Some(UNIQUE_VIOLATION), _) => Error::conflict_error("record already exists"),
            _ => Error::database_error(err),
        }
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        Error::authorization_engine_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::upstream_error(err)
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::malformed_input_error(rejection.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self.code {
            1..=99 => "Internal Server Error",
            _ => self.message.as_str(),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self.code {
            100..=199 => StatusCode::BAD_REQUEST,
            200 => StatusCode::UNAUTHORIZED,
            201 => StatusCode::FORBIDDEN,
            300 => StatusCode::NOT_FOUND,
            400 => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid_transition_error(message: impl Into<String>) -> Error {
        Error {
            code: 100,
            message: message.into(),
        }
    }

    pub fn invalid_input_error(message: impl Into<String>) -> Error {
        Error {
            code: 101,
            message: message.into(),
        }
    }

    pub fn malformed_input_error(message: impl Into<String>) -> Error {
        Error {
            code: 102,
            message: message.into(),
        }
    }

    pub fn insufficient_funds_error() -> Error {
        Error {
            code: 103,
            message: "insufficient funds".into(),
        }
    }

    pub fn insufficient_escrow_error() -> Error {
        Error {
            code: 104,
            message: "insufficient funds held in escrow".into(),
        }
    }

    pub fn unauthenticated_error() -> Error {
        Error {
            code: 200,
            message: "unauthenticated".into(),
        }
    }

    pub fn forbidden_error() -> Error {
        Error {
            code: 201,
            message: "forbidden".into(),
        }
    }

    pub fn not_found_error(what: &str) -> Error {
        Error {
            code: 300,
            message: format!("{} not found", what),
        }
    }

    pub fn conflict_error(message: impl Into<String>) -> Error {
        Error {
            code: 400,
            message: message.into(),
        }
    }

    pub fn env_var_error(_: env::VarError) -> Error {
        Error {
            code: 1,
            message: "environment variable error".into(),
        }
    }

    pub fn database_error<T: Debug>(err: T) -> Error {
        tracing::error!(error = ?err, "database error");

        Error {
            code: 2,
            message: "database error".into(),
        }
    }

    pub fn authorization_engine_error<T: Debug>(err: T) -> Error {
        tracing::error!(error = ?err, "authorization engine error");

        Error {
            code: 3,
            message: "authorization engine error".into(),
        }
    }

    pub fn upstream_error<T: Debug>(err: T) -> Error {
        tracing::warn!(error = ?err, "upstream error");

        Error {
            code: 4,
            message: "upstream error".into(),
        }
    }

    pub fn unexpected_error(message: impl Into<String>) -> Error {
        Error {
            code: 5,
            message: message.into(),
        }
    }

    pub fn configuration_error(message: impl Into<String>) -> Error {
        Error {
            code: 6,
            message: message.into(),
        }
    }

    pub fn is_invalid_transition_error(&self) -> bool {
        self.code == 100
    }

    pub fn is_invalid_input_error(&self) -> bool {
        self.code == 101 || self.code == 102
    }

    pub fn is_insufficient_funds_error(&self) -> bool {
        self.code == 103
    }

    pub fn is_insufficient_escrow_error(&self) -> bool {
        self.code == 104
    }

    pub fn is_forbidden_error(&self) -> bool {
        self.code == 201
    }

    pub fn is_not_found_error(&self) -> bool {
        self.code == 300
    }

    pub fn is_conflict_error(&self) -> bool {
        self.code == 400
    }
}

#[test]
fn status_mapping_test() {
    assert_eq!(
        Error::invalid_transition_error("x").status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(Error::insufficient_escrow_error().status(), StatusCode::BAD_REQUEST);
    assert_eq!(Error::unauthenticated_error().status(), StatusCode::UNAUTHORIZED);
    assert_eq!(Error::forbidden_error().status(), StatusCode::FORBIDDEN);
    assert_eq!(Error::not_found_error("load").status(), StatusCode::NOT_FOUND);
    assert_eq!(Error::conflict_error("x").status(), StatusCode::CONFLICT);
    assert_eq!(
        Error::unexpected_error("boom").status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn internal_message_hidden_test() {
    let response = Error::configuration_error("secret detail").into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = Error::not_found_error("bid").into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn row_not_found_maps_to_not_found_test() {
    let err: Error = sqlx::Error::RowNotFound.into();
    assert!(err.is_not_found_error());
}

#[cfg(test)]
#[derive(Debug)]
struct PgFailure {
    code: &'static str,
    constraint: Option<&'static str>,
}

#[cfg(test)]
impl Display for PgFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "postgres error {}", self.code)
    }
}

#[cfg(test)]
impl std::error::Error for PgFailure {}

#[cfg(test)]
impl sqlx::error::DatabaseError for PgFailure {
    fn message(&self) -> &str {
        "postgres error"
    }

    fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
        Some(self.code.into())
    }

    fn constraint(&self) -> Option<&str> {
        self.constraint
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }
}

#[cfg(test)]
fn pg_failure(code: &'static str, constraint: Option<&'static str>) -> Error {
    sqlx::Error::Database(Box::new(PgFailure { code, constraint })).into()
}

#[test]
fn lock_failures_map_to_conflict_test() {
    for code in [LOCK_NOT_AVAILABLE, SERIALIZATION_FAILURE, DEADLOCK_DETECTED] {
        let err = pg_failure(code, None);

        assert!(err.is_conflict_error(), "{}", code);
        assert_eq!(err.message, "load is being modified by another request");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}

#[test]
fn unique_violations_map_to_conflict_test() {
    let err = pg_failure("23505", Some("settlements_pkey"));
    assert!(err.is_conflict_error());
    assert_eq!(err.message, "load has already been settled");

    let err = pg_failure("23505", Some("wallets_pkey"));
    assert!(err.is_conflict_error());
    assert_eq!(err.message, "record already exists");

    let err = pg_failure("23505", None);
    assert_eq!(err.message, "record already exists");
}

#[test]
fn other_database_failures_stay_internal_test() {
    let err = pg_failure("23514", Some("wallets_balance_check"));

    assert!(!err.is_conflict_error());
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

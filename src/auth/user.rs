use std::fmt;
use std::str::FromStr;

use axum::http::HeaderMap;
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller as resolved by the upstream session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Driver,
    Admin,
}

impl Role {
    pub fn name(&self) -> String {
        match self {
            Self::Client => "client".into(),
            Self::Driver => "driver".into(),
            Self::Admin => "admin".into(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "driver" => Ok(Self::Driver),
            "admin" => Ok(Self::Admin),
            _ => Err(Error::unauthenticated_error()),
        }
    }
}

impl User {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    /// Reads the identity headers set by the session gateway.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, Error> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(Error::unauthenticated_error)
        };

        let id = header(USER_ID_HEADER)?
            .trim()
            .parse::<Uuid>()
            .map_err(|_| Error::unauthenticated_error())?;
        let role = header(USER_ROLE_HEADER)?.parse::<Role>()?;

        Ok(Self { id, role })
    }

    fn has_role(&self, role: String) -> bool {
        self.role.name() == role
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id.to_string())
            .add_attribute_getter("role", |recv: &User| recv.role.name())
            .add_method("has_role", User::has_role)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}

#[test]
fn from_headers_test() {
    let id = Uuid::new_v4();

    let mut headers = HeaderMap::new();
    headers.insert(USER_ID_HEADER, id.to_string().parse().unwrap());
    headers.insert(USER_ROLE_HEADER, "Driver".parse().unwrap());

    let user = User::from_headers(&headers).unwrap();
    assert_eq!(user, User::new(id, Role::Driver));
}

#[test]
fn missing_or_invalid_headers_test() {
    let mut headers = HeaderMap::new();
    assert_eq!(User::from_headers(&headers).unwrap_err().code, 200);

    headers.insert(USER_ID_HEADER, "not-a-uuid".parse().unwrap());
    headers.insert(USER_ROLE_HEADER, "client".parse().unwrap());
    assert_eq!(User::from_headers(&headers).unwrap_err().code, 200);

    headers.insert(USER_ID_HEADER, Uuid::new_v4().to_string().parse().unwrap());
    headers.insert(USER_ROLE_HEADER, "dispatcher".parse().unwrap());
    assert_eq!(User::from_headers(&headers).unwrap_err().code, 200);
}

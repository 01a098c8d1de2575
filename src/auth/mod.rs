pub mod authorizor;
mod platform;
mod user;

pub use platform::Platform;
pub use user::{Role, User, USER_ID_HEADER, USER_ROLE_HEADER};

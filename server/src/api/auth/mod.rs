//! Authentication module

mod basic;
pub mod middleware;

pub use basic::{Authorizer, BasicAuth, Credentials};
pub use middleware::{AuthError, AuthState, require_auth};

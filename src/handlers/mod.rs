//! HTTP handlers for the SSO portal.

pub mod apps;
pub mod auth;

pub use apps::*;
pub use auth::*;

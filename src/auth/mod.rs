//! Token to identity resolution, consumed once per join

pub mod token;

pub use token::{AuthError, GuestResolver, Identity, IdentityResolver, JwtResolver};

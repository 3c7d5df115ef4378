//! Bearer token storage.
//!
//! The token is read from the `CAMPUS_ENERGY_TOKEN` environment variable
//! or from the OS keychain via keyring. Obtaining a token (login) is
//! handled elsewhere.

pub mod token;

pub use token::{TokenStore, TOKEN_ENV_VAR};

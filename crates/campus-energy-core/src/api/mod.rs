//! REST gateway to the campus energy backend.
//!
//! `RemoteGateway` is the seam the sync orchestrator talks to;
//! `ApiClient` implements it over HTTP with bearer token authentication.
//! Every call either returns a normalized model or a `RemoteError`.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::ApiClient;
pub use error::RemoteError;
pub use gateway::RemoteGateway;

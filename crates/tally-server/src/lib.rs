//! # tally-server
//!
//! Single-endpoint JSON-RPC service over the tally store.
//!
//! Every call builds a [`Request`] from the raw body, hands it to a
//! [`Controller`] together with a request-scoped [`tally_store::Storage`]
//! handle, and serializes the resulting [`Response`].

pub mod controller;
pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use controller::Controller;
pub use error::{ErrorCode, RpcError};
pub use request::{Method, Request, Violation};
pub use response::Response;
pub use server::{ServerConfig, ServerHandle, handle, start};

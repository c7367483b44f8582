//! localloop-core - Core library for LocalLoop
//!
//! This crate contains the client side of the LocalLoop lending
//! marketplace: the session manager, the REST transport, the server push
//! router and the caches that mirror backend state for the CLI.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod models;
pub mod pending;
pub mod storage;
pub mod util;

#[cfg(test)]
mod testing;

pub use context::AppContext;
pub use error::{Error, ErrorKind, Result};

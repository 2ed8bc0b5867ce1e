//! RestGuard kernel library.
//!
//! Dynamic, database-driven request authorization and per-user menu trees
//! for an admin backend. The `restguard` binary serves this over HTTP.

pub mod access;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;

//! Field attendance agent: multi-factor attendance verification with an
//! encrypted offline queue that is replayed against the backend on reconnect.

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod routes;
pub mod services;
pub mod store;
pub mod sync;
pub mod verify;

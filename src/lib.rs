//! forge-hooks: outbound webhook delivery engine.
//!
//! A library that turns repository events recorded as hook tasks into
//! signed HTTP requests for third-party receivers, records the outcome
//! of every attempt, and supports operator replay.

pub mod config;
pub mod crypto;
pub mod delivery;
pub mod handler;
pub mod model;
pub mod payload;
pub mod repo;
pub mod signature;
pub mod store;
pub mod time;
pub mod transport;

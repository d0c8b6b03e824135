//! # quintet
//!
//! The Quintet fact server: HTTP API, CLI and configuration around
//! `quintet-core`. Exposed as a library so integration tests can build the
//! router without a listening socket.

pub mod api;
pub mod cli;
pub mod config;

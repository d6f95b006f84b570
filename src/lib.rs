//! Grace chat client library.
//!
//! This module exports public APIs for testing and extension.

pub mod app;
pub mod chat;
pub mod config;
pub mod paths;
pub mod providers;
pub mod session;
pub mod store;

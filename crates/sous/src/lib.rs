//! Sous - streaming chat relay for a recipe assistant
//!
//! This crate provides a small HTTP server that relays chat requests to an
//! OpenAI-compatible model provider and streams the answer back to the
//! browser with periodic progress events.

pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod testing;

pub use error::SousError;

//! # skyloc Common Library
//!
//! Shared code for the skyloc services including:
//! - Wire types delivered to subscribers (LocatedImage and friends)
//! - Configuration loading (TOML bootstrap file)
//! - Server-Sent Events helpers
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};

//! # WPA Common Library
//!
//! Shared code for the WikiProject assessment tools including:
//! - Database initialization, migrations and typed row models
//! - Configuration loading and database path resolution
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};

//! CRM Bridge - Backend Library
//!
//! Business-management backend whose core is the EspoCRM bidirectional
//! synchronization bridge.

#[macro_use]
mod macros;

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};

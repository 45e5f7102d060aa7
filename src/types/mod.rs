//! Token Service Types
//!
//! Core type definitions for token issuance and validation.

pub mod auth;
pub mod client;
pub mod config;
pub mod token;

pub use auth::*;
pub use client::*;
pub use config::*;
pub use token::*;

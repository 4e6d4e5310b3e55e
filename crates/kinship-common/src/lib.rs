//! # kinship-common
//!
//! Shared types, configuration, error handling and small utilities used by
//! every Kinship crate. No persistence and no transport live here.

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod models;
pub mod permissions;
pub mod ranks;
pub mod snowflake;
pub mod validation;

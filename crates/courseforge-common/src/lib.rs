//! # courseforge-common
//!
//! Shared types, configuration, error handling, and the pure scheduling
//! primitives used across all Courseforge crates. No I/O lives here.

pub mod audience;
pub mod auth;
pub mod config;
pub mod drip;
pub mod error;
pub mod models;
pub mod payments;
pub mod schedule;
pub mod snowflake;
pub mod streak;
pub mod validation;

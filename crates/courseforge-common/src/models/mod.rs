//! Core domain models shared across all Courseforge services.
//!
//! These are the "truth" types — what the database stores and the API serializes.
//! Every row is keyed by a UUID v7, generated in application code.

pub mod analytics;
pub mod coaching;
pub mod commerce;
pub mod community;
pub mod course;
pub mod email;
pub mod user;
pub mod video;

/// Re-export all model types for convenience.
pub use analytics::*;
pub use coaching::*;
pub use commerce::*;
pub use community::*;
pub use course::*;
pub use email::*;
pub use user::*;
pub use video::*;

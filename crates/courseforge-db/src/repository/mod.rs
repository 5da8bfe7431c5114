//! Repository layer — query functions organized by domain.

pub mod analytics;
pub mod coaching;
pub mod courses;
pub mod dms;
pub mod email;
pub mod entitlements;
pub mod forums;
pub mod lessons;
pub mod orders;
pub mod progress;
pub mod users;
pub mod video_jobs;

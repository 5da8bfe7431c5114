//! # courseforge-jobs
//!
//! Work that runs outside the request/response cycle:
//! - [`video`]: sequential batch video rendering
//! - [`email_dispatch`]: periodic email program fan-out
//!
//! Both runners are written against small store traits so they can be
//! driven by PostgreSQL in production and by in-memory fakes in tests.

pub mod email_dispatch;
pub mod video;

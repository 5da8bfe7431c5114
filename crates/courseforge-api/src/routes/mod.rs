//! API route modules.

pub mod analytics;
pub mod audience;
pub mod auth;
pub mod coaching;
pub mod commerce;
pub mod courses;
pub mod dms;
pub mod email;
pub mod forums;
pub mod health;
pub mod lessons;
pub mod users;
pub mod video;
pub mod webhooks;

use serde::Deserialize;

/// `?limit=&offset=` query parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Clamped `(limit, offset)` for a repository call.
    pub fn resolve(&self, default: i64) -> (i64, i64) {
        let max = courseforge_common::config::get().limits.max_page_size;
        (
            courseforge_common::validation::page_limit(self.limit, default, max),
            self.offset.unwrap_or(0).max(0),
        )
    }
}

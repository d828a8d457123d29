use std::sync::Arc;

use axum::Router;

use crate::error::{AppError, AppResult};
use crate::AppState;

pub mod categories;
pub mod health;
pub mod timetable;

/// Everything served under `/api`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/categories", categories::router())
        .nest("/timetable", timetable::router())
}

/// Longest code or search query accepted.
pub const MAX_QUERY_LEN: usize = 64;

pub(crate) fn check_query_len(value: &str) -> AppResult<()> {
    if value.chars().count() > MAX_QUERY_LEN {
        return Err(AppError::BadRequest(format!(
            "Query longer than {} characters",
            MAX_QUERY_LEN
        )));
    }
    Ok(())
}

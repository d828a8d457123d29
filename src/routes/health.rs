use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::services::timetable::DateWindow;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// `redis` or `memory`.
    pub cache: String,
    pub academic_year: AcademicYear,
}

#[derive(Serialize)]
pub struct AcademicYear {
    pub start: String,
    pub end: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let year = DateWindow::academic_year(now);

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now.to_rfc3339(),
        cache: if state.config.redis.url.is_some() {
            "redis"
        } else {
            "memory"
        }
        .to_string(),
        academic_year: AcademicYear {
            start: year.start.to_rfc3339(),
            end: year.end.to_rfc3339(),
        },
    };

    (StatusCode::OK, Json(response))
}

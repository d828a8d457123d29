use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::models::event::parse_timestamp;
use crate::models::{CategoryType, Event};
use crate::routes::check_query_len;
use crate::AppState;

/// Router for merged timetables
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_timetable))
}

/// Comma separated codes per kind; each code may be an identity, an exact
/// code or a fuzzy query.
#[derive(Debug, Deserialize)]
pub struct TimetableQuery {
    pub courses: Option<String>,
    pub modules: Option<String>,
    pub locations: Option<String>,
    pub clubs: Option<String>,
    pub societies: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (midnight UTC)
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Resolve the requested codes and return their events ordered by start.
async fn get_timetable(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimetableQuery>,
) -> AppResult<Json<Vec<Event>>> {
    let mut codes = BTreeMap::new();
    for (category_type, raw) in [
        (CategoryType::Course, &query.courses),
        (CategoryType::Module, &query.modules),
        (CategoryType::Location, &query.locations),
        (CategoryType::Club, &query.clubs),
        (CategoryType::Society, &query.societies),
    ] {
        let list = split_codes(raw.as_deref());
        for code in &list {
            check_query_len(code)?;
        }
        if !list.is_empty() {
            codes.insert(category_type, list);
        }
    }

    if codes.is_empty() {
        return Err(AppError::BadRequest(
            "At least one of courses, modules, locations, clubs or societies is required".to_string(),
        ));
    }

    let start = query.start.as_deref().map(parse_bound).transpose()?;
    let end = query.end.as_deref().map(parse_bound).transpose()?;

    let identities = state
        .resolver
        .resolve_all(&codes)
        .await?
        .into_iter()
        .map(|(category_type, items)| {
            (
                category_type,
                items.into_iter().map(|item| item.identity).collect(),
            )
        })
        .collect();

    let mut events = state
        .timetables
        .events_for_all(&identities, start, end)
        .await?;
    events.sort_by_key(|event| event.start);

    Ok(Json(events))
}

fn split_codes(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bound(raw: &str) -> AppResult<DateTime<Utc>> {
    if let Some(instant) = parse_timestamp(raw) {
        return Ok(instant);
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid date: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get, json_body};
    use crate::services::mock::{app_state, event, item, MockUpstream};
    use crate::services::timetable::DateWindow;
    use axum::http::StatusCode;
    use chrono::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MockUpstream>) {
        let t = DateWindow::academic_year(Utc::now()).start + Duration::days(30);
        let upstream = Arc::new(
            MockUpstream::new()
                .with_category(
                    CategoryType::Module,
                    vec![item(CategoryType::Module, "m-ca116", "CA116[1] Computing Fundamentals")],
                )
                .with_category(
                    CategoryType::Location,
                    vec![item(CategoryType::Location, "l-c117", "GLA.C117")],
                )
                .with_timetable(
                    CategoryType::Module,
                    "m-ca116",
                    vec![event("late", t + Duration::days(1)), event("early", t)],
                )
                .with_timetable(
                    CategoryType::Location,
                    "l-c117",
                    vec![event("room", t + Duration::hours(2))],
                ),
        );

        let app = Router::new()
            .nest("/api/timetable", router())
            .with_state(app_state(upstream.clone()));
        (app, upstream)
    }

    #[tokio::test]
    async fn merges_kinds_in_start_order() {
        let (app, upstream) = app();

        let res = app
            .oneshot(get("/api/timetable?modules=CA116&locations=GLA.C117"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = json_body(res).await;
        let order: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["identity"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["early", "room", "late"]);
        assert_eq!(upstream.event_calls(), 2);
    }

    #[tokio::test]
    async fn requires_at_least_one_code() {
        let (app, _) = app();
        let res = app.oneshot(get("/api/timetable?modules=,")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_code_reports_it() {
        let (app, _) = app();
        let res = app
            .oneshot(get("/api/timetable?modules=ZZZ9999"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body = json_body(res).await;
        assert_eq!(body["error"]["code"], "INVALID_CODE");
        assert_eq!(body["error"]["details"]["code"], "ZZZ9999");
    }

    #[tokio::test]
    async fn inverted_range_is_unprocessable() {
        let (app, upstream) = app();
        let res = app
            .oneshot(get(
                "/api/timetable?modules=CA116&start=2025-03-01&end=2025-02-01",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(upstream.event_calls(), 0);
    }

    #[tokio::test]
    async fn overlong_code_is_rejected_before_lookup() {
        let (app, upstream) = app();
        let res = app
            .oneshot(get(&format!("/api/timetable?modules=CA116,{}", "X".repeat(200))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.category_page_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_date_is_bad_request() {
        let (app, _) = app();
        let res = app
            .oneshot(get("/api/timetable?modules=CA116&start=soon"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bounds_accept_dates_and_timestamps() {
        assert_eq!(
            parse_bound("2025-02-01").unwrap(),
            parse_bound("2025-02-01T00:00:00Z").unwrap()
        );
        assert_eq!(split_codes(Some(" CA116, ,CA117 ")), vec!["CA116", "CA117"]);
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::models::{CategoryItem, CategoryType};
use crate::routes::check_query_len;
use crate::AppState;

const DEFAULT_COUNT: usize = 10;
const MAX_COUNT: usize = 100;

/// Router for catalog lookups (autocomplete and single items)
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:kind", get(search_category))
        .route("/:kind/:identity", get(get_category_item))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Code, name fragment or identity to match
    pub query: Option<String>,
    /// Maximum number of results to return
    pub count: Option<usize>,
}

fn parse_kind(kind: &str) -> AppResult<CategoryType> {
    CategoryType::try_from(kind).map_err(AppError::BadRequest)
}

/// Search a catalog. Without a query the first `count` items are listed.
async fn search_category(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<CategoryItem>>> {
    let category_type = parse_kind(&kind)?;
    if let Some(q) = query.query.as_deref() {
        check_query_len(q)?;
    }
    let count = query.count.unwrap_or(DEFAULT_COUNT).clamp(1, MAX_COUNT);

    let items = state
        .resolver
        .search(category_type, query.query.as_deref(), count)
        .await?;

    Ok(Json(items))
}

async fn get_category_item(
    State(state): State<Arc<AppState>>,
    Path((kind, identity)): Path<(String, String)>,
) -> AppResult<Json<CategoryItem>> {
    let category_type = parse_kind(&kind)?;
    // Scientia identities are UUIDs; club and society ids are not.
    if category_type.scientia_identity().is_some() {
        uuid::Uuid::parse_str(&identity)
            .map_err(|_| AppError::BadRequest(format!("Invalid identity: {}", identity)))?;
    }

    state
        .resolver
        .get_item(category_type, &identity)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{} {}", category_type, identity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get, json_body};
    use crate::services::mock::{app_state, item, MockUpstream};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    const CA116: &str = "0f4e9b3c-6c1a-4d2e-9a41-4b7d5e0c1a16";

    fn app() -> Router {
        let upstream = MockUpstream::new().with_category(
            CategoryType::Module,
            vec![
                item(CategoryType::Module, CA116, "CA116[1] Computing Fundamentals"),
                item(
                    CategoryType::Module,
                    "7d2c1e55-0a9b-4f3e-8c6d-2b1a0e9f8c17",
                    "CA117[2] Computer Programming II",
                ),
            ],
        )
        .with_category(
            CategoryType::Society,
            vec![item(CategoryType::Society, "12", "Redbrick")],
        );

        Router::new()
            .nest("/api/categories", router())
            .with_state(app_state(Arc::new(upstream)))
    }

    #[tokio::test]
    async fn search_returns_matches() {
        let res = app()
            .oneshot(get("/api/categories/modules?query=ca116&count=5"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = json_body(res).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["code"], "CA116[1]");
        assert_eq!(items[0]["category_type"], "module");
    }

    #[tokio::test]
    async fn search_without_query_lists_items() {
        let res = app().oneshot(get("/api/categories/module")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn overlong_query_is_rejected() {
        let query = "A".repeat(65);
        let res = app()
            .oneshot(get(&format!("/api/categories/modules?query={}", query)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_kind_is_bad_request() {
        let res = app().oneshot(get("/api/categories/planets")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn item_lookup_by_identity() {
        let res = app()
            .oneshot(get(&format!("/api/categories/module/{}", CA116)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["identity"], CA116);

        let res = app()
            .oneshot(get(
                "/api/categories/module/00000000-0000-0000-0000-000000000000",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app()
            .oneshot(get("/api/categories/module/CA116"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn society_lookup_accepts_plain_ids() {
        let res = app()
            .oneshot(get("/api/categories/societies/12"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["name"], "Redbrick");
    }
}

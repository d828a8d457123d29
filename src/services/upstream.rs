use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::UpstreamConfig;
use crate::error::{AppError, AppResult};
use crate::models::payload::{
    CategoryTypeWithIdentities, EventFilterRequest, RawCategoryPage, RawTimetableResponse,
    ViewDay, ViewOptions,
};
use crate::models::{CategoryItem, CategoryItemTimetable, CategoryType};

/// One page of a catalog listing.
#[derive(Debug, Clone, Default)]
pub struct CategoryPage {
    pub results: Vec<CategoryItem>,
    pub total_pages: u32,
    pub count: u32,
}

/// Everything the service needs from the scheduling API.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch_category_page(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
        page: u32,
    ) -> AppResult<CategoryPage>;

    /// Fetch the events of several items of one kind in a single request.
    ///
    /// Items without any events may be missing from the result.
    async fn fetch_events_for_identities(
        &self,
        category_type: CategoryType,
        identities: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CategoryItemTimetable>>;

    /// Fetch a whole listing: page 1 reports the page count, the remaining
    /// pages are requested concurrently and any failure aborts the listing.
    async fn fetch_category(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
    ) -> AppResult<CategoryPage> {
        let first = self.fetch_category_page(category_type, query, 1).await?;
        if first.total_pages <= 1 {
            return Ok(first);
        }

        let rest = futures::future::try_join_all(
            (2..=first.total_pages).map(|page| self.fetch_category_page(category_type, query, page)),
        )
        .await?;

        let mut listing = first;
        for page in rest {
            listing.results.extend(page.results);
        }

        tracing::info!(
            "Fetched {} {} items over {} pages",
            listing.results.len(),
            category_type,
            listing.total_pages
        );

        Ok(listing)
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Sends each catalog to the API that serves it: courses, modules and
/// locations to Scientia, clubs and societies to the groups API.
pub struct CatalogRouter {
    scientia: Arc<dyn UpstreamClient>,
    groups: Option<Arc<dyn UpstreamClient>>,
}

impl CatalogRouter {
    pub fn new(
        scientia: Arc<dyn UpstreamClient>,
        groups: Option<Arc<dyn UpstreamClient>>,
    ) -> Self {
        Self { scientia, groups }
    }

    fn client_for(&self, category_type: CategoryType) -> AppResult<&dyn UpstreamClient> {
        match category_type {
            CategoryType::Club | CategoryType::Society => {
                self.groups.as_deref().ok_or_else(|| {
                    AppError::Validation(format!(
                        "Category type '{}' is not configured on this server",
                        category_type
                    ))
                })
            }
            _ => Ok(self.scientia.as_ref()),
        }
    }
}

#[async_trait]
impl UpstreamClient for CatalogRouter {
    async fn fetch_category_page(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
        page: u32,
    ) -> AppResult<CategoryPage> {
        self.client_for(category_type)?
            .fetch_category_page(category_type, query, page)
            .await
    }

    async fn fetch_events_for_identities(
        &self,
        category_type: CategoryType,
        identities: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CategoryItemTimetable>> {
        self.client_for(category_type)?
            .fetch_events_for_identities(category_type, identities, start, end)
            .await
    }

    async fn fetch_category(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
    ) -> AppResult<CategoryPage> {
        self.client_for(category_type)?
            .fetch_category(category_type, query)
            .await
    }
}

// ============================================================================
// Retries
// ============================================================================

/// HTTP client configured with the upstream request timeout.
pub fn http_client(config: &UpstreamConfig) -> AppResult<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?)
}

/// Fixed-backoff retry policy shared by the upstream clients.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_secs(config.retry_backoff_seconds),
        }
    }

    /// Send a request with a fixed backoff between attempts.
    ///
    /// Network errors, 429 and 5xx responses are retried; any other non-success
    /// status is surfaced immediately. After `max_attempts` the last failure is
    /// reported as `UpstreamUnavailable`.
    pub async fn send_with_backoff<F>(&self, make_request: F) -> AppResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match (make_request)().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp)
                    if resp.status() == StatusCode::TOO_MANY_REQUESTS
                        || resp.status().is_server_error() =>
                {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        "Transient upstream error (status: {}). Retrying in {}s (attempt {}/{})",
                        status,
                        self.backoff.as_secs(),
                        attempt,
                        self.max_attempts
                    );
                    last_error = format!("{}: {}", status, body);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    tracing::error!("Upstream rejected request ({}): {}", status, body);
                    return Err(AppError::UpstreamUnavailable(format!("{}: {}", status, body)));
                }
                Err(e) => {
                    tracing::warn!(
                        "Upstream request failed: {}. Retrying in {}s (attempt {}/{})",
                        e,
                        self.backoff.as_secs(),
                        attempt,
                        self.max_attempts
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        tracing::error!(
            "Upstream failed after {} attempts: {}",
            self.max_attempts,
            last_error
        );
        Err(AppError::UpstreamUnavailable(format!(
            "Failed after {} attempts: {}",
            self.max_attempts, last_error
        )))
    }
}

// ============================================================================
// Scientia
// ============================================================================

/// Client for the Scientia public timetabling API.
#[derive(Debug, Clone)]
pub struct ScientiaClient {
    client: Client,
    base_url: String,
    institution_identity: String,
    retry: RetryPolicy,
}

impl ScientiaClient {
    pub fn new(config: &UpstreamConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            institution_identity: config.institution_identity.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn category_type_identity(category_type: CategoryType) -> AppResult<&'static str> {
        category_type.scientia_identity().ok_or_else(|| {
            AppError::Validation(format!(
                "Category type '{}' is not served by the timetable API",
                category_type
            ))
        })
    }

    /// POST to `path` and decode the JSON response, retrying transient failures.
    async fn post_json<B, T>(&self, path: &str, query: &[(&str, String)], body: Option<&B>) -> AppResult<T>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .retry
            .send_with_backoff(|| {
                let request = self
                    .client
                    .post(&url)
                    .query(query)
                    .header(AUTHORIZATION, "Anonymous")
                    .header(CONTENT_TYPE, "application/json");

                match body {
                    Some(body) => request.json(body),
                    None => request,
                }
            })
            .await?;

        response.json::<T>().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Unreadable response from {}: {}", path, e))
        })
    }
}

#[async_trait]
impl UpstreamClient for ScientiaClient {
    async fn fetch_category_page(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
        page: u32,
    ) -> AppResult<CategoryPage> {
        let type_identity = Self::category_type_identity(category_type)?;
        let path = format!(
            "CategoryTypes/{}/Categories/FilterWithCache/{}",
            type_identity, self.institution_identity
        );
        let params = [
            ("pageNumber", page.to_string()),
            ("query", query.unwrap_or_default().to_string()),
        ];

        let raw: RawCategoryPage = self.post_json::<(), _>(&path, &params, None).await?;

        Ok(CategoryPage {
            results: raw
                .results
                .into_iter()
                .map(|item| CategoryItem::from_payload(category_type, item))
                .collect(),
            total_pages: raw.total_pages,
            count: raw.count,
        })
    }

    async fn fetch_events_for_identities(
        &self,
        category_type: CategoryType,
        identities: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CategoryItemTimetable>> {
        let type_identity = Self::category_type_identity(category_type)?;
        let path = format!(
            "CategoryTypes/Categories/Events/Filter/{}",
            self.institution_identity
        );
        let params = [
            ("startRange", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("endRange", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        // Teaching only happens Monday to Friday.
        let body = EventFilterRequest {
            view_options: ViewOptions {
                days: (1..=5).map(|day_of_week| ViewDay { day_of_week }).collect(),
            },
            category_types_with_identities: vec![CategoryTypeWithIdentities {
                category_type_identity: type_identity.to_string(),
                category_identities: identities.to_vec(),
            }],
        };

        let raw: RawTimetableResponse = self.post_json(&path, &params, Some(&body)).await?;

        Ok(raw
            .category_events
            .into_iter()
            .map(|events| CategoryItemTimetable::from_payload(category_type, events))
            .collect())
    }
}

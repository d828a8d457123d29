//! Clubs and societies, served by a separate scraper API.
//!
//! Listings are small and unpaged. A group's timetable is its one-off events
//! followed by its weekly activities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::UpstreamConfig;
use crate::error::{AppError, AppResult};
use crate::models::payload::{RawCategoryItem, RawGroup, RawGroupEvent, RawGroupSession};
use crate::models::{CategoryItem, CategoryItemTimetable, CategoryType, Event};
use crate::services::upstream::{http_client, CategoryPage, RetryPolicy, UpstreamClient};

const SITE: &str = "dcuclubsandsocs.ie";

/// Client for the clubs and societies API.
#[derive(Debug, Clone)]
pub struct CnsClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CnsClient {
    pub fn new(base_url: &str, config: &UpstreamConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn group_path(category_type: CategoryType) -> AppResult<&'static str> {
        match category_type {
            CategoryType::Club => Ok("club"),
            CategoryType::Society => Ok("society"),
            other => Err(AppError::Validation(format!(
                "Category type '{}' is not served by the clubs and societies API",
                other
            ))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let url = format!("{}/{}/{}", self.base_url, SITE, path);

        let response = self
            .retry
            .send_with_backoff(|| self.client.get(&url))
            .await?;

        response.json::<T>().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Unreadable response from {}: {}", path, e))
        })
    }

    async fn fetch_group_timetable(
        &self,
        category_type: CategoryType,
        identity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<CategoryItemTimetable> {
        let group = Self::group_path(category_type)?;
        let (events, activities) = futures::future::try_join(
            self.get_json::<Vec<RawGroupEvent>>(&format!("{}/{}/events", group, identity)),
            self.get_json::<Vec<RawGroupSession>>(&format!("{}/{}/activities", group, identity)),
        )
        .await?;

        let events = events
            .into_iter()
            .enumerate()
            .map(|(i, raw)| (format!("{}-event-{}", identity, i), raw.session, raw.cost))
            .chain(
                activities
                    .into_iter()
                    .enumerate()
                    .map(|(i, raw)| (format!("{}-activity-{}", identity, i), raw, None)),
            )
            .filter_map(|(event_identity, session, cost)| {
                let event = Event::from_group_session(event_identity.clone(), session, cost);
                if event.is_none() {
                    tracing::warn!(
                        "Skipping {} of {} {}: unreadable timestamps",
                        event_identity,
                        category_type,
                        identity
                    );
                }
                event
            })
            .filter(|event| start <= event.start && event.start <= end)
            .collect();

        Ok(CategoryItemTimetable {
            category_type,
            identity: identity.to_string(),
            name: identity.to_string(),
            events,
        })
    }
}

#[async_trait]
impl UpstreamClient for CnsClient {
    /// Locked groups are hidden. `query` is matched case-insensitively
    /// against the group name.
    async fn fetch_category_page(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
        _page: u32,
    ) -> AppResult<CategoryPage> {
        let groups: Vec<RawGroup> = self.get_json(Self::group_path(category_type)?).await?;
        let query = query.map(str::to_uppercase);

        let results: Vec<CategoryItem> = groups
            .into_iter()
            .filter(|group| !group.is_locked)
            .filter(|group| {
                query
                    .as_deref()
                    .map_or(true, |q| group.name.to_uppercase().contains(q))
            })
            .map(|group| {
                CategoryItem::from_payload(
                    category_type,
                    RawCategoryItem {
                        identity: group.id,
                        name: group.name,
                        description: None,
                        parent_category_identities: Vec::new(),
                    },
                )
            })
            .collect();

        Ok(CategoryPage {
            count: results.len() as u32,
            results,
            total_pages: 1,
        })
    }

    async fn fetch_events_for_identities(
        &self,
        category_type: CategoryType,
        identities: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CategoryItemTimetable>> {
        futures::future::try_join_all(
            identities
                .iter()
                .map(|identity| self.fetch_group_timetable(category_type, identity, start, end)),
        )
        .await
    }
}

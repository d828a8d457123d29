//! In-process `UpstreamClient` used by unit and route tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::cache::{CacheStore, MemoryCache};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::payload::RawCategoryItem;
use crate::models::{CategoryItem, CategoryItemTimetable, CategoryType, Event};
use crate::services::resolver::CategoryResolver;
use crate::services::timetable::TimetableAggregator;
use crate::services::upstream::{CategoryPage, UpstreamClient};
use crate::AppState;

/// Default-configured state over a fresh memory cache and `upstream`.
pub fn app_state(upstream: Arc<MockUpstream>) -> Arc<AppState> {
    let config = Config::default();
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());

    Arc::new(AppState {
        resolver: CategoryResolver::new(
            cache.clone(),
            upstream.clone(),
            StdDuration::from_secs(config.cache.category_ttl_seconds),
        ),
        timetables: TimetableAggregator::new(
            cache,
            upstream,
            StdDuration::from_secs(config.cache.timetable_ttl_seconds),
        ),
        config,
    })
}

pub fn item(category_type: CategoryType, identity: &str, name: &str) -> CategoryItem {
    CategoryItem::from_payload(
        category_type,
        RawCategoryItem {
            identity: identity.to_string(),
            name: name.to_string(),
            description: None,
            parent_category_identities: Vec::new(),
        },
    )
}

pub fn event(identity: &str, start: DateTime<Utc>) -> Event {
    Event {
        identity: identity.to_string(),
        start,
        end: start + Duration::hours(1),
        status_identity: "status".to_string(),
        locations: None,
        description: None,
        name: "CA116[1]OC/L1/01".to_string(),
        event_type: "On Campus".to_string(),
        last_modified: start,
        module_name: None,
        staff_member: None,
        weeks: None,
        group_name: None,
        parsed_name_data: Vec::new(),
    }
}

#[derive(Default)]
pub struct MockUpstream {
    categories: HashMap<CategoryType, Vec<CategoryItem>>,
    page_size: HashMap<CategoryType, usize>,
    timetables: HashMap<(CategoryType, String), Vec<Event>>,
    failing_page: Option<u32>,
    fail_events: bool,
    category_page_calls: AtomicUsize,
    event_calls: AtomicUsize,
    event_windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` generated items named `ITEM000`, `ITEM001`... split over `pages` pages.
    pub fn with_items(self, category_type: CategoryType, count: usize, pages: usize) -> Self {
        let items = (0..count)
            .map(|i| {
                item(
                    category_type,
                    &format!("{}-{}", category_type, i),
                    &format!("ITEM{:03} Generated", i),
                )
            })
            .collect();
        self.with_paged_category(category_type, items, count.div_ceil(pages.max(1)))
    }

    pub fn with_category(self, category_type: CategoryType, items: Vec<CategoryItem>) -> Self {
        let page_size = items.len();
        self.with_paged_category(category_type, items, page_size)
    }

    fn with_paged_category(
        mut self,
        category_type: CategoryType,
        items: Vec<CategoryItem>,
        page_size: usize,
    ) -> Self {
        self.categories.insert(category_type, items);
        self.page_size.insert(category_type, page_size.max(1));
        self
    }

    pub fn with_timetable(
        mut self,
        category_type: CategoryType,
        identity: &str,
        events: Vec<Event>,
    ) -> Self {
        self.timetables
            .insert((category_type, identity.to_string()), events);
        self
    }

    pub fn failing_page(mut self, page: u32) -> Self {
        self.failing_page = Some(page);
        self
    }

    pub fn failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    pub fn category_page_calls(&self) -> usize {
        self.category_page_calls.load(Ordering::SeqCst)
    }

    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    pub fn event_windows(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.event_windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn fetch_category_page(
        &self,
        category_type: CategoryType,
        query: Option<&str>,
        page: u32,
    ) -> AppResult<CategoryPage> {
        self.category_page_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_page == Some(page) {
            return Err(AppError::UpstreamUnavailable(format!("page {} failed", page)));
        }

        let items: Vec<CategoryItem> = self
            .categories
            .get(&category_type)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|item| {
                query.map_or(true, |q| item.name.to_uppercase().contains(&q.to_uppercase()))
            })
            .collect();
        let page_size = self.page_size.get(&category_type).copied().unwrap_or(1);
        let total_pages = items.len().div_ceil(page_size).max(1) as u32;

        Ok(CategoryPage {
            count: items.len() as u32,
            results: items
                .chunks(page_size)
                .nth(page as usize - 1)
                .map(|chunk| chunk.to_vec())
                .unwrap_or_default(),
            total_pages,
        })
    }

    async fn fetch_events_for_identities(
        &self,
        category_type: CategoryType,
        identities: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CategoryItemTimetable>> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.event_windows.lock().unwrap().push((start, end));

        if self.fail_events {
            return Err(AppError::UpstreamUnavailable("events failed".to_string()));
        }

        Ok(identities
            .iter()
            .filter_map(|identity| {
                let events = self.timetables.get(&(category_type, identity.clone()))?;
                Some(CategoryItemTimetable {
                    category_type,
                    identity: identity.clone(),
                    name: identity.clone(),
                    events: events
                        .iter()
                        .filter(|e| e.start >= start && e.start <= end)
                        .cloned()
                        .collect(),
                })
            })
            .collect())
    }
}

/// Minimal HTTP/1.1 server answering every request through `respond`, which
/// maps the request path (with query) to a status and JSON body.
pub struct StubServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl StubServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let respond = Arc::new(respond);

        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let counter = counter.clone();
                let respond = respond.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);

                    let request = String::from_utf8_lossy(&request);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = (*respond)(&path);
                    let response = format!(
                        "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
        }
    }

    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

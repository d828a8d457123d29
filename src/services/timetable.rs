use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::cache::{CacheExt, CacheKey, CacheStore};
use crate::error::{AppError, AppResult};
use crate::models::{CategoryItemTimetable, CategoryType, Event};
use crate::services::upstream::UpstreamClient;

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// The teaching year containing `now`: 1 August to 1 May.
    pub fn academic_year(now: DateTime<Utc>) -> Self {
        let year = if now.month() >= 8 {
            now.year()
        } else {
            now.year() - 1
        };

        Self {
            start: first_of_month(year, 8),
            end: first_of_month(year + 1, 5),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    pub fn covers(&self, other: &DateWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

fn first_of_month(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
        .and_utc()
}

/// Gathers the events of catalog items, cache first.
#[derive(Clone)]
pub struct TimetableAggregator {
    cache: Arc<dyn CacheStore>,
    upstream: Arc<dyn UpstreamClient>,
    timetable_ttl: Duration,
}

impl TimetableAggregator {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        upstream: Arc<dyn UpstreamClient>,
        timetable_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            upstream,
            timetable_ttl,
        }
    }

    /// Events of every item in `identities` starting within `start..=end`.
    ///
    /// Missing bounds default to the current academic year. Cached timetables
    /// are filtered locally; the rest are fetched in one upstream request and
    /// cached per item. Timetables are only cached when the requested range
    /// lies inside the academic year, since they are then fetched for the
    /// whole year. Identities unknown upstream contribute no events.
    pub async fn events_for(
        &self,
        category_type: CategoryType,
        identities: &[String],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Event>> {
        let academic_year = DateWindow::academic_year(Utc::now());
        let window = DateWindow {
            start: start.unwrap_or(academic_year.start),
            end: end.unwrap_or(academic_year.end),
        };
        if window.start > window.end {
            return Err(AppError::Validation(format!(
                "Start {} is after end {}",
                window.start, window.end
            )));
        }

        let cacheable = academic_year.covers(&window);
        if !cacheable {
            tracing::warn!(
                "Requested range {} - {} reaches outside the academic year, results will not be cached",
                window.start,
                window.end
            );
        }

        let mut seen = HashSet::new();
        let mut events = Vec::new();
        let mut missing = Vec::new();

        for identity in identities.iter().filter(|id| seen.insert(id.as_str())) {
            let cached = if cacheable {
                let key = CacheKey::timetable(category_type, identity);
                self.cache.get_json::<CategoryItemTimetable>(&key).await
            } else {
                None
            };

            match cached {
                Some(timetable) => {
                    tracing::info!(
                        "Using cached events for {} {} (total {})",
                        category_type,
                        identity,
                        timetable.events.len()
                    );
                    events.extend(filter_events(timetable.events, &window));
                }
                None => missing.push(identity.clone()),
            }
        }

        if missing.is_empty() {
            return Ok(events);
        }

        let fetch_window = if cacheable { academic_year } else { window };
        let timetables = self
            .upstream
            .fetch_events_for_identities(category_type, &missing, fetch_window.start, fetch_window.end)
            .await?;

        for timetable in timetables {
            tracing::info!(
                "Fetched events for {} {} (total {})",
                category_type,
                timetable.identity,
                timetable.events.len()
            );

            if cacheable {
                let key = CacheKey::timetable(category_type, &timetable.identity);
                self.cache
                    .set_json(&key, &timetable, Some(self.timetable_ttl))
                    .await;
            }

            events.extend(filter_events(timetable.events, &window));
        }

        Ok(events)
    }

    /// `events_for` across several kinds.
    pub async fn events_for_all(
        &self,
        identities: &BTreeMap<CategoryType, Vec<String>>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Event>> {
        let mut events = Vec::new();

        for (&category_type, ids) in identities {
            if ids.is_empty() {
                continue;
            }
            events.extend(self.events_for(category_type, ids, start, end).await?);
        }

        Ok(events)
    }
}

fn filter_events(events: Vec<Event>, window: &DateWindow) -> impl Iterator<Item = Event> + '_ {
    events.into_iter().filter(move |event| window.contains(event.start))
}

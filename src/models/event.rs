use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::payload::{RawEvent, RawGroupSession};
use crate::models::{Location, LocationParser, NameParser, ParsedNameData};

const MODULE_NAME_RANK: u32 = 1;
const STAFF_MEMBER_RANK: u32 = 2;
const WEEKS_RANK: u32 = 3;

/// No teaching calendar runs longer than this.
const MAX_WEEK: u32 = 60;

/// A single timetabled event, normalised at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub identity: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status_identity: String,
    /// `None` when upstream sent no location at all.
    pub locations: Option<Vec<Location>>,
    pub description: Option<String>,
    pub name: String,
    pub event_type: String,
    pub last_modified: DateTime<Utc>,
    /// e.g. `CSC1003[1] Computer Programming I`
    pub module_name: Option<String>,
    /// e.g. `Blott S`
    pub staff_member: Option<String>,
    pub weeks: Option<Vec<u32>>,
    pub group_name: Option<String>,
    /// Empty when the name could not be parsed.
    pub parsed_name_data: Vec<ParsedNameData>,
}

impl Event {
    /// Build an event from its upstream payload.
    ///
    /// Returns `None` if any of the timestamps cannot be read; every other
    /// field degrades to an empty or fallback value instead.
    pub fn from_payload(payload: RawEvent) -> Option<Self> {
        let start = parse_timestamp(&payload.start_date_time)?;
        let end = parse_timestamp(&payload.end_date_time)?;
        let last_modified = parse_timestamp(&payload.last_modified)?;

        let mut module_name = None;
        let mut staff_member = None;
        let mut weeks = None;
        for property in payload.extra_properties {
            match property.rank {
                MODULE_NAME_RANK => module_name = property.value,
                STAFF_MEMBER_RANK => staff_member = property.value,
                WEEKS_RANK => weeks = property.value.as_deref().map(parse_weeks),
                _ => {}
            }
        }

        let description = payload.description.unwrap_or_default();
        let group_name = group_name(&payload.name, &description);

        Some(Self {
            identity: payload.identity,
            start,
            end,
            status_identity: payload.status_identity,
            locations: payload.location.as_deref().map(LocationParser::parse),
            description: Some(description.trim().to_string()).filter(|d| !d.is_empty()),
            parsed_name_data: NameParser::parse(&payload.name),
            name: payload.name,
            event_type: payload.event_type,
            last_modified,
            module_name,
            staff_member,
            weeks,
            group_name,
        })
    }

    /// Build an event from a club or society session. `cost` is only present
    /// for one-off events and is appended to the description.
    ///
    /// Returns `None` if either timestamp cannot be read.
    pub fn from_group_session(
        identity: String,
        session: RawGroupSession,
        cost: Option<f64>,
    ) -> Option<Self> {
        let start = parse_timestamp(&session.start)?;
        let end = parse_timestamp(&session.end)?;

        let mut description = session.description.unwrap_or_default().trim().to_string();
        if let Some(cost) = cost {
            let cost = if cost > 0.0 {
                format!("€{:.2}", cost)
            } else {
                "FREE".to_string()
            };
            description = format!("{}\nCost: {}", description, cost)
                .trim()
                .to_string();
        }

        Some(Self {
            identity,
            start,
            end,
            status_identity: String::new(),
            locations: session
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| vec![Location::unparsed(l)]),
            description: Some(description).filter(|d| !d.is_empty()),
            name: session.name,
            event_type: session.kind,
            last_modified: start,
            module_name: None,
            staff_member: None,
            weeks: None,
            group_name: None,
            parsed_name_data: Vec::new(),
        })
    }
}

/// Upstream timestamps are ISO 8601, with or without an offset. Offset-less
/// values are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Expand a week list such as `"1-4, 6"` into `[1, 2, 3, 4, 6]`.
///
/// Inverted ranges and week numbers above 60 are dropped.
pub fn parse_weeks(weeks: &str) -> Vec<u32> {
    let mut result = Vec::new();

    for part in weeks.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = match part.split_once('-') {
            Some((from, to)) => from
                .trim()
                .parse::<u32>()
                .and_then(|from| to.trim().parse::<u32>().map(|to| (from, to))),
            None => part.parse::<u32>().map(|week| (week, week)),
        };

        match parsed {
            Ok((from, to)) if from <= to && to <= MAX_WEEK => result.extend(from..=to),
            Ok(_) => tracing::warn!("Ignoring out of range week range '{}'", part),
            Err(_) => tracing::warn!("Ignoring unreadable week range '{}'", part),
        }
    }

    result
}

/// Pick a group letter out of the event name or description, e.g.
/// `"Lab Group b"` -> `B`. Later markers take precedence over earlier ones.
fn group_name(name: &str, description: &str) -> Option<String> {
    let name = name.to_lowercase().replace(' ', "");
    let description = description.to_lowercase().replace(' ', "");

    ["group", "grp"]
        .iter()
        .filter_map(|marker| {
            [&name, &description].iter().find_map(|value| {
                let index = value.find(marker)? + marker.len();
                value[index..].chars().next()
            })
        })
        .last()
        .map(|c| c.to_uppercase().to_string())
}

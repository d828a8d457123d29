//! Wire shapes of the Scientia public API and the clubs and societies API.
//!
//! These mirror the upstream JSON field-for-field and are converted into the
//! domain models as soon as they are received; nothing else in the crate
//! should depend on them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCategoryPage {
    #[serde(default)]
    pub results: Vec<RawCategoryItem>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCategoryItem {
    pub identity: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_category_identities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawTimetableResponse {
    #[serde(default)]
    pub category_events: Vec<RawCategoryEvents>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCategoryEvents {
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub results: Vec<RawEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawEvent {
    pub identity: String,
    pub start_date_time: String,
    pub end_date_time: String,
    #[serde(default)]
    pub status_identity: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub event_type: String,
    pub last_modified: String,
    #[serde(default)]
    pub extra_properties: Vec<RawExtraProperty>,
}

/// Ranked free-form property attached to an event.
///
/// Rank 1 is the module name, rank 2 the staff member and rank 3 the week list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawExtraProperty {
    pub rank: u32,
    #[serde(default)]
    pub value: Option<String>,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventFilterRequest {
    pub view_options: ViewOptions,
    pub category_types_with_identities: Vec<CategoryTypeWithIdentities>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewOptions {
    pub days: Vec<ViewDay>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewDay {
    pub day_of_week: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoryTypeWithIdentities {
    pub category_type_identity: String,
    pub category_identities: Vec<String>,
}

// ============================================================================
// Clubs and societies
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroup {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_locked: bool,
}

/// Fields shared by one-off events and weekly activities.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGroupSession {
    pub name: String,
    pub start: String,
    pub end: String,
    /// Usually `IN-PERSON` or `VIRTUAL`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroupEvent {
    #[serde(flatten)]
    pub session: RawGroupSession,
    #[serde(default)]
    pub cost: Option<f64>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected group id: {}",
            other
        ))),
    }
}

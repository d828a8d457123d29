use serde::{Deserialize, Serialize};

use crate::models::payload::{RawCategoryEvents, RawCategoryItem};
use crate::models::{Event, LocationParser};

// ============================================================================
// Category Types
// ============================================================================

/// Kind of catalog an item belongs to. Doubles as the cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Course,
    Module,
    Location,
    Club,
    Society,
}

impl CategoryType {
    /// Catalogs served by the Scientia timetabling API.
    pub const SCIENTIA: [CategoryType; 3] = [
        CategoryType::Course,
        CategoryType::Module,
        CategoryType::Location,
    ];

    /// Convert from string (case-insensitive, singular or plural)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "course" | "courses" => Some(CategoryType::Course),
            "module" | "modules" => Some(CategoryType::Module),
            "location" | "locations" => Some(CategoryType::Location),
            "club" | "clubs" => Some(CategoryType::Club),
            "society" | "societies" => Some(CategoryType::Society),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryType::Course => "course",
            CategoryType::Module => "module",
            CategoryType::Location => "location",
            CategoryType::Club => "club",
            CategoryType::Society => "society",
        }
    }

    /// Scientia category-type identity, if this catalog lives in Scientia.
    ///
    /// Courses are called "Programmes of Study" upstream.
    pub fn scientia_identity(self) -> Option<&'static str> {
        match self {
            CategoryType::Course => Some("241e4d36-60e0-49f8-b27e-99416745d98d"),
            CategoryType::Module => Some("525fe79b-73c3-4b5c-8186-83c652b3adcc"),
            CategoryType::Location => Some("1e042cb1-547d-41d4-ae93-a1f2c3d34538"),
            CategoryType::Club | CategoryType::Society => None,
        }
    }
}

impl std::fmt::Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CategoryType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value).ok_or_else(|| format!("Invalid category type: {}", value))
    }
}

// ============================================================================
// Catalog Items
// ============================================================================

/// One entry in a catalog: a course, module or location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryItem {
    /// Upstream-issued identity, the only key stable across refreshes.
    pub identity: String,
    /// - Courses: the course code, e.g. `COMSCI1`
    /// - Modules: code, semester and title, e.g. `CSC1003[1] Computer Programming I`
    /// - Locations: the location code(s), e.g. `GLA.C117 & C122`
    pub name: String,
    /// Short code derived from `name`, e.g. `CSC1003[1]` or `GLA.C117 GLA.C122`.
    pub code: String,
    pub description: Option<String>,
    pub category_type: CategoryType,
    pub parent_category_identities: Vec<String>,
}

impl CategoryItem {
    pub fn from_payload(category_type: CategoryType, payload: RawCategoryItem) -> Self {
        let code = derive_code(category_type, &payload.name);

        Self {
            identity: payload.identity,
            code,
            description: payload
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            category_type,
            parent_category_identities: payload.parent_category_identities,
            name: payload.name,
        }
    }
}

fn derive_code(category_type: CategoryType, name: &str) -> String {
    if category_type == CategoryType::Location {
        LocationParser::parse(name)
            .iter()
            .map(|loc| loc.to_string())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    } else {
        name.split_whitespace().next().unwrap_or_default().to_string()
    }
}

/// A whole catalog listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub items: Vec<CategoryItem>,
    /// Item count as reported upstream.
    pub count: u32,
}

impl Category {
    pub fn find_identity(&self, identity: &str) -> Option<&CategoryItem> {
        self.items.iter().find(|item| item.identity == identity)
    }
}

// ============================================================================
// Timetables
// ============================================================================

/// The events belonging to one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryItemTimetable {
    pub category_type: CategoryType,
    pub identity: String,
    pub name: String,
    pub events: Vec<Event>,
}

impl CategoryItemTimetable {
    pub fn from_payload(category_type: CategoryType, payload: RawCategoryEvents) -> Self {
        let events = payload
            .results
            .into_iter()
            .filter_map(|raw| {
                let identity = raw.identity.clone();
                let event = Event::from_payload(raw);
                if event.is_none() {
                    tracing::warn!(
                        "Skipping event {} of {} {}: unreadable timestamps",
                        identity,
                        category_type,
                        payload.identity
                    );
                }
                event
            })
            .collect();

        Self {
            category_type,
            identity: payload.identity,
            name: payload.name,
            events,
        }
    }
}

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static::lazy_static! {
    // Room number includes its floor character: `C117` -> building C, floor 1, room 117.
    static ref LOCATION_REGEX: Regex = Regex::new(
        r"^(?:(?P<campus>[A-Z]{3})\.)?(?P<building>VB|[A-Z][AC-FH-Z]?)(?P<room>(?P<floor>[BG1-9])[0-9A-Za-z\- ()]+)$"
    )
    .expect("location regex is valid");
}

/// A room, or the raw location text when it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// `GLA`, `SPC` or `AHC`; empty when the code carried no campus prefix.
    pub campus: String,
    pub building: String,
    /// `B` basement, `G` ground, or a floor number.
    pub floor: String,
    pub room: String,
    /// Set only when parsing failed. Display-only: do not group by building.
    pub original: Option<String>,
}

impl Location {
    pub fn unparsed(original: &str) -> Self {
        Self {
            campus: String::new(),
            building: String::new(),
            floor: String::new(),
            room: String::new(),
            original: Some(original.to_string()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.original {
            Some(original) => f.write_str(original),
            None if self.campus.is_empty() => write!(f, "{}{}", self.building, self.room),
            None => write!(f, "{}.{}{}", self.campus, self.building, self.room),
        }
    }
}

/// Parses Scientia location strings such as `GLA.C117 & C122, SPC.E203`.
pub struct LocationParser;

impl LocationParser {
    /// Parse `raw` into one location per room.
    ///
    /// Never fails: if no room can be parsed the result is a single unparsed
    /// location carrying the whole input.
    pub fn parse(raw: &str) -> Vec<Location> {
        let locations: Vec<Location> = Self::split(raw)
            .iter()
            .filter_map(|atom| Self::parse_atom(atom))
            .collect();

        if locations.is_empty() {
            tracing::warn!("Could not parse location '{}'", raw);
            return vec![Location::unparsed(raw)];
        }

        locations
    }

    /// Expand a location string into atomic room codes.
    ///
    /// Entries are comma separated; an entry may list several rooms joined by
    /// `&` that share the campus prefix of the first room.
    fn split(raw: &str) -> Vec<String> {
        let mut atoms = Vec::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if !entry.contains('&') {
                atoms.push(entry.to_string());
                continue;
            }

            let mut rooms = entry.split('&').map(str::trim).filter(|r| !r.is_empty());
            let Some(first) = rooms.next() else {
                continue;
            };
            let campus = first.split_once('.').map(|(campus, _)| campus);
            atoms.push(first.to_string());

            for room in rooms {
                match campus {
                    Some(campus) if !room.contains('.') => atoms.push(format!("{}.{}", campus, room)),
                    _ => atoms.push(room.to_string()),
                }
            }
        }

        atoms
    }

    fn parse_atom(atom: &str) -> Option<Location> {
        let caps = LOCATION_REGEX.captures(atom)?;
        let group = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };

        Some(Location {
            campus: group("campus"),
            building: group("building"),
            floor: group("floor"),
            room: group("room"),
            original: None,
        })
    }
}

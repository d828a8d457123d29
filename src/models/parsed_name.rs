use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static::lazy_static! {
    // Module codes, optional [semester], optional delivery token, `/`, activity
    // letters with an optional sequence number, then an optional `/group`.
    static ref EVENT_NAME_REGEX: Regex = Regex::new(concat!(
        r"(?P<modules>[A-Z]+[0-9]+[A-Z]?(?:/[A-Z]+[0-9]+[A-Z]?)*)",
        r"(?:\[(?P<semester>[0-2F](?:,[0-2F])*)\])?",
        r"(?P<delivery>OC|0C|ASY|AS|AY|SY|HY)?/",
        r"(?P<activity>EX|[PLTWSAE]{1,2})[0-9]{0,2}",
        r"(?:/(?P<group>[0-9]+))?",
    ))
    .expect("event name regex is valid");

    static ref STRAY_SLASH_REGEX: Regex =
        Regex::new(r"\]/(OC|0C|ASY|AS|AY|SY|HY)/").expect("stray slash regex is valid");

    // A lone semester digit between the module and delivery, e.g. `CA116 1 OC/L1`.
    static ref BARE_SEMESTER_REGEX: Regex =
        Regex::new(r"([A-Z0-9])\s+([0-2])\s*(OC|0C|ASY|AS|AY|SY|HY)\s*/")
            .expect("bare semester regex is valid");
}

// ============================================================================
// Name Components
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Semester {
    #[serde(rename = "ALL_YEAR")]
    AllYear,
    #[serde(rename = "SEMESTER_1")]
    Semester1,
    #[serde(rename = "SEMESTER_2")]
    Semester2,
}

impl Semester {
    /// `0`, comma lists and `F` all mean the module runs the whole year.
    fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("1") => Semester::Semester1,
            Some("2") => Semester::Semester2,
            _ => Semester::AllYear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryType {
    OnCampus,
    /// Recorded.
    Asynchronous,
    /// Online, live.
    Synchronous,
    Hybrid,
}

impl DeliveryType {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "OC" | "0C" => Some(DeliveryType::OnCampus),
            "ASY" | "AS" | "AY" => Some(DeliveryType::Asynchronous),
            "SY" => Some(DeliveryType::Synchronous),
            "HY" => Some(DeliveryType::Hybrid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Practical,
    Lecture,
    Tutorial,
    Workshop,
    Seminar,
    WorkshopSeminar,
    Exam,
    Assessment,
    /// Two different activities sharing one slot, e.g. `LT`.
    Combined,
}

impl ActivityType {
    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'P' => Some(ActivityType::Practical),
            'L' => Some(ActivityType::Lecture),
            'T' => Some(ActivityType::Tutorial),
            'W' => Some(ActivityType::Workshop),
            'S' => Some(ActivityType::Seminar),
            'E' => Some(ActivityType::Exam),
            'A' => Some(ActivityType::Assessment),
            _ => None,
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        let mut letters = code.chars();
        let first = letters.next()?;

        match (first, letters.next()) {
            ('E', Some('X')) => Some(ActivityType::Exam),
            ('W', Some('S')) => Some(ActivityType::WorkshopSeminar),
            (a, Some(b)) if a != b => {
                Self::from_letter(a)?;
                Self::from_letter(b)?;
                Some(ActivityType::Combined)
            }
            (a, _) => Self::from_letter(a),
        }
    }
}

/// Structured data recovered from a cryptic event name like `CA116[1]OC/L1/01`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedNameData {
    /// e.g. `["PS114", "PS114A"]`
    pub module_codes: Vec<String>,
    pub semester: Semester,
    pub delivery_type: Option<DeliveryType>,
    pub activity_type: ActivityType,
    pub group_number: Option<u32>,
}

// ============================================================================
// Parser
// ============================================================================

pub struct NameParser;

impl NameParser {
    /// Parse every activity described by an event name.
    ///
    /// Returns an empty list when nothing could be recognised; event names
    /// are free text upstream and a failed parse is never an error.
    pub fn parse(raw: &str) -> Vec<ParsedNameData> {
        if !raw.contains('/') {
            tracing::warn!("Event name '{}' has no activity separator, skipping parse", raw);
            return Vec::new();
        }

        let corrected = Self::correct(raw);
        let parsed: Vec<ParsedNameData> = EVENT_NAME_REGEX
            .captures_iter(&corrected)
            .filter_map(|caps| {
                let module_codes = caps
                    .name("modules")?
                    .as_str()
                    .split('/')
                    .filter(|code| !code.is_empty())
                    .map(String::from)
                    .collect();

                Some(ParsedNameData {
                    module_codes,
                    semester: Semester::from_code(caps.name("semester").map(|m| m.as_str())),
                    delivery_type: caps
                        .name("delivery")
                        .and_then(|m| DeliveryType::from_code(m.as_str())),
                    activity_type: ActivityType::from_code(caps.name("activity")?.as_str())?,
                    group_number: caps.name("group").and_then(|m| m.as_str().parse().ok()),
                })
            })
            .collect();

        if parsed.is_empty() {
            tracing::warn!("Could not parse event name '{}'", raw);
        }

        parsed
    }

    fn correct(raw: &str) -> String {
        let upper = raw.to_uppercase();
        let mut data: String = BARE_SEMESTER_REGEX
            .replace_all(&upper, "${1}[${2}]${3}/")
            .chars()
            .filter(|c| !matches!(c, ' ' | '{' | '}'))
            .map(|c| match c {
                '(' => '[',
                ')' => ']',
                other => other,
            })
            .collect();

        while data.contains("//") {
            data = data.replace("//", "/");
        }

        STRAY_SLASH_REGEX.replace_all(&data, "]${1}/").into_owned()
    }
}

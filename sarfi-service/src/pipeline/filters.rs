use sarfi_client::domain::EventQuery;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const ALL_VOLTAGE_LEVELS: &str = "All";

/// `"All"` disables the filter; any other value must match the event's
/// voltage-level tag exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VoltageLevelFilter {
    #[default]
    All,
    Exact(String),
}

impl From<String> for VoltageLevelFilter {
    fn from(s: String) -> Self {
        if s == ALL_VOLTAGE_LEVELS {
            Self::All
        } else {
            Self::Exact(s)
        }
    }
}

impl From<&str> for VoltageLevelFilter {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<VoltageLevelFilter> for String {
    fn from(f: VoltageLevelFilter) -> Self {
        match f {
            VoltageLevelFilter::All => ALL_VOLTAGE_LEVELS.to_string(),
            VoltageLevelFilter::Exact(level) => level,
        }
    }
}

impl std::fmt::Display for VoltageLevelFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str(ALL_VOLTAGE_LEVELS),
            Self::Exact(level) => f.write_str(level),
        }
    }
}

/// Per-call filter set. Callers own any persistence of their last selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SarfiFilters {
    #[serde(default)]
    pub voltage_level: VoltageLevelFilter,
    #[serde(default)]
    pub exclude_special_events: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end: Option<OffsetDateTime>,
}

impl SarfiFilters {
    pub fn event_query(&self, meter_ids: Vec<String>) -> EventQuery {
        let voltage_level = match &self.voltage_level {
            VoltageLevelFilter::All => None,
            VoltageLevelFilter::Exact(level) => Some(level.clone()),
        };

        EventQuery {
            meter_ids,
            voltage_level,
            exclude_special: self.exclude_special_events,
            start: self.start,
            end: self.end,
        }
    }
}

use std::collections::HashSet;

use time::OffsetDateTime;

pub const VOLTAGE_DIP: &str = "voltage_dip";

/// Retained voltage assumed for an event that carries no measurement.
pub const NO_DIP_VOLTAGE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoltageDipEvent {
    pub id: i64,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(default))]
    pub meter_id: Option<String>,
    pub event_type: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub voltage_level: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_special_event: Option<bool>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub remaining_voltage: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub magnitude: Option<f64>,
}

impl VoltageDipEvent {
    /// Retained voltage in percent: `remaining_voltage`, else `magnitude`, else 100.
    pub fn retained_voltage(&self) -> f64 {
        self.remaining_voltage
            .or(self.magnitude)
            .unwrap_or(NO_DIP_VOLTAGE)
    }

    /// A null flag counts as not special.
    pub fn is_special(&self) -> bool {
        self.is_special_event.unwrap_or(false)
    }
}

/// Filter applied when fetching events for a SARFI run.
///
/// The event type is always `voltage_dip`. `voltage_level` is matched exactly
/// (case-sensitive); `None` means every level. The time window is half-open,
/// `[start, end)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub meter_ids: Vec<String>,
    pub voltage_level: Option<String>,
    pub exclude_special: bool,
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl EventQuery {
    /// In-memory form of the predicate `list_events` pushes down to SQL.
    ///
    /// Builds the meter set on every call; use [`EventQuery::matcher`] when
    /// filtering many events.
    pub fn matches(&self, event: &VoltageDipEvent) -> bool {
        self.matcher().matches(event)
    }

    pub fn matcher(&self) -> EventMatcher<'_> {
        EventMatcher {
            query: self,
            meter_ids: self.meter_ids.iter().map(String::as_str).collect(),
        }
    }
}

/// An [`EventQuery`] with its meter ids hashed once.
#[derive(Debug, Clone)]
pub struct EventMatcher<'a> {
    query: &'a EventQuery,
    meter_ids: HashSet<&'a str>,
}

impl EventMatcher<'_> {
    pub fn matches(&self, event: &VoltageDipEvent) -> bool {
        let q = self.query;
        if event.event_type != VOLTAGE_DIP {
            return false;
        }

        match event.meter_id.as_deref() {
            Some(id) if self.meter_ids.contains(id) => {}
            _ => return false,
        }

        if let Some(level) = &q.voltage_level {
            if event.voltage_level.as_deref() != Some(level.as_str()) {
                return false;
            }
        }

        if q.exclude_special && event.is_special() {
            return false;
        }

        if let Some(start) = q.start {
            if event.ts < start {
                return false;
            }
        }
        if let Some(end) = q.end {
            if event.ts >= end {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn event(id: i64, level: &str, special: Option<bool>) -> VoltageDipEvent {
        VoltageDipEvent {
            id,
            ts: datetime!(2024-06-01 12:00:00 UTC),
            meter_id: Some("m-1".to_string()),
            event_type: VOLTAGE_DIP.to_string(),
            voltage_level: Some(level.to_string()),
            is_special_event: special,
            remaining_voltage: None,
            magnitude: None,
        }
    }

    fn query() -> EventQuery {
        EventQuery {
            meter_ids: vec!["m-1".to_string()],
            ..EventQuery::default()
        }
    }

    #[test]
    fn retained_voltage_prefers_remaining_then_magnitude_then_100() {
        let mut e = event(1, "132kV", None);
        assert_eq!(e.retained_voltage(), NO_DIP_VOLTAGE);

        e.magnitude = Some(62.0);
        assert_eq!(e.retained_voltage(), 62.0);

        e.remaining_voltage = Some(41.5);
        assert_eq!(e.retained_voltage(), 41.5);
    }

    #[test]
    fn exclude_special_keeps_null_and_false() {
        let q = EventQuery {
            exclude_special: true,
            ..query()
        };

        assert!(q.matches(&event(1, "132kV", None)));
        assert!(q.matches(&event(2, "132kV", Some(false))));
        assert!(!q.matches(&event(3, "132kV", Some(true))));

        // Without the flag, special events are counted.
        assert!(query().matches(&event(3, "132kV", Some(true))));
    }

    #[test]
    fn voltage_level_is_exact_and_case_sensitive() {
        let q = EventQuery {
            voltage_level: Some("132kV".to_string()),
            ..query()
        };

        assert!(q.matches(&event(1, "132kV", None)));
        assert!(!q.matches(&event(2, "132KV", None)));
        assert!(!q.matches(&event(3, "33kV", None)));
        assert!(!q.matches(&event(4, " 132kV", None)));
    }

    #[test]
    fn rejects_other_event_types_unattributed_and_foreign_meters() {
        let q = query();

        let mut swell = event(1, "132kV", None);
        swell.event_type = "voltage_swell".to_string();
        assert!(!q.matches(&swell));

        let mut orphan = event(2, "132kV", None);
        orphan.meter_id = None;
        assert!(!q.matches(&orphan));

        let mut foreign = event(3, "132kV", None);
        foreign.meter_id = Some("m-9".to_string());
        assert!(!q.matches(&foreign));
    }

    #[test]
    fn window_is_half_open() {
        let q = EventQuery {
            start: Some(datetime!(2024-06-01 12:00:00 UTC)),
            end: Some(datetime!(2024-07-01 00:00:00 UTC)),
            ..query()
        };

        let mut e = event(1, "132kV", None);
        assert!(q.matches(&e));

        e.ts = datetime!(2024-07-01 00:00:00 UTC);
        assert!(!q.matches(&e));

        e.ts = datetime!(2024-06-01 11:59:59 UTC);
        assert!(!q.matches(&e));
    }

    #[test]
    fn matcher_filters_a_batch_against_many_meters() {
        let q = EventQuery {
            meter_ids: (0..500).map(|i| format!("m-{i}")).collect(),
            ..EventQuery::default()
        };
        let matcher = q.matcher();

        let events: Vec<VoltageDipEvent> = (0..1000)
            .map(|i| {
                let mut e = event(i, "132kV", None);
                e.meter_id = Some(format!("m-{}", i * 3));
                e
            })
            .collect();

        let kept = events.iter().filter(|e| matcher.matches(e)).count();
        // m-0, m-3, ..., m-498
        assert_eq!(kept, 167);
        assert!(events.iter().all(|e| matcher.matches(e) == q.matches(e)));
    }
}

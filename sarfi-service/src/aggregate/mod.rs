use std::collections::{HashMap, HashSet};

use sarfi_client::domain::{VoltageDipEvent, Weight};
use serde::{Deserialize, Serialize};

use crate::pipeline::catalog::ResolvedCatalog;

pub mod sort;

pub use sort::{sort_data_points, DataPointField, DataPointSort, SortFieldError, SortOrder};

/// The six SARFI counters reported per meter.
///
/// Counter `sarfi_X` counts events whose retained voltage is at or below
/// `100 - X` percent, so `sarfi_70` counts dips to 30% or less. IEEE 1564
/// defines SARFI-X on retained voltage <= X. The reported numbers depend on
/// this mapping, so it stays as-is until product confirms which one is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SarfiThreshold {
    Sarfi10,
    Sarfi30,
    Sarfi50,
    Sarfi70,
    Sarfi80,
    Sarfi90,
}

impl SarfiThreshold {
    pub const ALL: [SarfiThreshold; 6] = [
        SarfiThreshold::Sarfi10,
        SarfiThreshold::Sarfi30,
        SarfiThreshold::Sarfi50,
        SarfiThreshold::Sarfi70,
        SarfiThreshold::Sarfi80,
        SarfiThreshold::Sarfi90,
    ];

    pub fn label(self) -> u8 {
        match self {
            Self::Sarfi10 => 10,
            Self::Sarfi30 => 30,
            Self::Sarfi50 => 50,
            Self::Sarfi70 => 70,
            Self::Sarfi80 => 80,
            Self::Sarfi90 => 90,
        }
    }

    /// Retained voltage (percent) at or below which the counter increments.
    pub fn cutoff(self) -> f64 {
        match self {
            Self::Sarfi10 => 90.0,
            Self::Sarfi30 => 70.0,
            Self::Sarfi50 => 50.0,
            Self::Sarfi70 => 30.0,
            Self::Sarfi80 => 20.0,
            Self::Sarfi90 => 10.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sarfi10 => "sarfi_10",
            Self::Sarfi30 => "sarfi_30",
            Self::Sarfi50 => "sarfi_50",
            Self::Sarfi70 => "sarfi_70",
            Self::Sarfi80 => "sarfi_80",
            Self::Sarfi90 => "sarfi_90",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for SarfiThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per SARFI threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SarfiValues<T> {
    pub sarfi_10: T,
    pub sarfi_30: T,
    pub sarfi_50: T,
    pub sarfi_70: T,
    pub sarfi_80: T,
    pub sarfi_90: T,
}

impl<T: Copy> SarfiValues<T> {
    pub fn get(&self, threshold: SarfiThreshold) -> T {
        match threshold {
            SarfiThreshold::Sarfi10 => self.sarfi_10,
            SarfiThreshold::Sarfi30 => self.sarfi_30,
            SarfiThreshold::Sarfi50 => self.sarfi_50,
            SarfiThreshold::Sarfi70 => self.sarfi_70,
            SarfiThreshold::Sarfi80 => self.sarfi_80,
            SarfiThreshold::Sarfi90 => self.sarfi_90,
        }
    }

    pub fn get_mut(&mut self, threshold: SarfiThreshold) -> &mut T {
        match threshold {
            SarfiThreshold::Sarfi10 => &mut self.sarfi_10,
            SarfiThreshold::Sarfi30 => &mut self.sarfi_30,
            SarfiThreshold::Sarfi50 => &mut self.sarfi_50,
            SarfiThreshold::Sarfi70 => &mut self.sarfi_70,
            SarfiThreshold::Sarfi80 => &mut self.sarfi_80,
            SarfiThreshold::Sarfi90 => &mut self.sarfi_90,
        }
    }
}

pub type SarfiCounts = SarfiValues<u32>;

impl SarfiCounts {
    /// Increment every counter whose cutoff is at or above `retained_voltage`.
    pub fn record(&mut self, retained_voltage: f64) {
        for threshold in SarfiThreshold::ALL {
            if retained_voltage <= threshold.cutoff() {
                *self.get_mut(threshold) += 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarfiDataPoint {
    pub meter_id: String,
    pub meter_code: String,
    pub location: Option<String>,
    pub voltage_level: String,
    #[serde(flatten)]
    pub counts: SarfiCounts,
    pub weight_factor: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedSummary {
    #[serde(flatten)]
    pub values: SarfiValues<f64>,
    pub total_weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SarfiReport {
    pub per_meter: Vec<SarfiDataPoint>,
    pub summary: WeightedSummary,
}

/// Result of a pure aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub report: SarfiReport,
    /// Events whose meter id was null or did not map to a data point.
    pub unmapped_events: usize,
}

/// Zeroed data points for every weighted meter that resolved in the catalog,
/// in weight-row order. A repeated meter id keeps its first row.
pub fn initialize_data_points(weights: &[Weight], catalog: &ResolvedCatalog) -> Vec<SarfiDataPoint> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(weights.len());
    let mut points = Vec::with_capacity(weights.len());

    for w in weights {
        if !seen.insert(w.meter_id.as_str()) {
            tracing::warn!(
                profile_id = %w.profile_id,
                meter_id = %w.meter_id,
                "duplicate weight row for meter, keeping the first"
            );
            continue;
        }

        let Some(meter) = catalog.get(&w.meter_id) else {
            continue;
        };

        points.push(SarfiDataPoint {
            meter_id: w.meter_id.clone(),
            meter_code: meter.display_code.clone(),
            location: meter.location.clone(),
            voltage_level: meter.effective_voltage_level().to_string(),
            counts: SarfiCounts::default(),
            weight_factor: w.effective_factor(),
        });
    }

    points
}

/// Single pass over `events`, returning how many could not be attributed.
pub fn count_events(points: &mut [SarfiDataPoint], events: &[VoltageDipEvent]) -> usize {
    let index: HashMap<String, usize> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (p.meter_id.clone(), i))
        .collect();

    let mut unmapped = 0;
    for event in events {
        let slot = event
            .meter_id
            .as_deref()
            .and_then(|id| index.get(id).copied());

        match slot {
            Some(i) => points[i].counts.record(event.retained_voltage()),
            None => unmapped += 1,
        }
    }

    unmapped
}

pub fn weighted_summary(points: &[SarfiDataPoint]) -> WeightedSummary {
    let total_weight: f64 = points.iter().map(|p| p.weight_factor).sum();

    let mut values = SarfiValues::<f64>::default();
    if total_weight > 0.0 {
        for threshold in SarfiThreshold::ALL {
            let weighted_sum: f64 = points
                .iter()
                .map(|p| f64::from(p.counts.get(threshold)) * p.weight_factor)
                .sum();
            *values.get_mut(threshold) = weighted_sum / total_weight;
        }
    }

    WeightedSummary { values, total_weight }
}

/// Initialize, count and weight in one go.
pub fn aggregate(weights: &[Weight], catalog: &ResolvedCatalog, events: &[VoltageDipEvent]) -> Aggregation {
    let mut per_meter = initialize_data_points(weights, catalog);
    let unmapped_events = count_events(&mut per_meter, events);
    let summary = weighted_summary(&per_meter);

    Aggregation {
        report: SarfiReport { per_meter, summary },
        unmapped_events,
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u32;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_opt_str(hasher: &mut blake3::Hasher, s: &Option<String>) {
    match s {
        Some(v) => {
            hasher.update(&[1]);
            hash_str(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

impl SarfiReport {
    /// Content digest of the report. Two runs over the same profile, filters
    /// and event snapshot produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&(self.per_meter.len() as u64).to_le_bytes());
        for p in &self.per_meter {
            hash_str(&mut h, &p.meter_id);
            hash_str(&mut h, &p.meter_code);
            hash_opt_str(&mut h, &p.location);
            hash_str(&mut h, &p.voltage_level);
            for threshold in SarfiThreshold::ALL {
                h.update(&p.counts.get(threshold).to_le_bytes());
            }
            hash_f64(&mut h, p.weight_factor);
        }
        for threshold in SarfiThreshold::ALL {
            hash_f64(&mut h, self.summary.values.get(threshold));
        }
        hash_f64(&mut h, self.summary.total_weight);
        h.finalize().to_hex().to_string()
    }
}

use std::{cmp::Ordering, str::FromStr};

use super::{SarfiDataPoint, SarfiThreshold};

/// Fields the per-meter table can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPointField {
    MeterId,
    MeterCode,
    Location,
    VoltageLevel,
    WeightFactor,
    Count(SarfiThreshold),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SortFieldError {
    #[error("unknown sort field: {0}")]
    UnknownField(String),
    #[error("unknown sort order: {0} (expected asc or desc)")]
    UnknownOrder(String),
}

impl FromStr for DataPointField {
    type Err = SortFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meter_id" => Ok(Self::MeterId),
            "meter_code" => Ok(Self::MeterCode),
            "location" => Ok(Self::Location),
            "voltage_level" => Ok(Self::VoltageLevel),
            "weight_factor" => Ok(Self::WeightFactor),
            other => SarfiThreshold::from_name(other)
                .map(Self::Count)
                .ok_or_else(|| SortFieldError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = SortFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Ascending),
            "desc" => Ok(Self::Descending),
            other => Err(SortFieldError::UnknownOrder(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPointSort {
    pub field: DataPointField,
    pub order: SortOrder,
}

impl DataPointField {
    fn compare(self, a: &SarfiDataPoint, b: &SarfiDataPoint) -> Ordering {
        match self {
            Self::MeterId => a.meter_id.cmp(&b.meter_id),
            Self::MeterCode => a.meter_code.cmp(&b.meter_code),
            // Missing locations sort first.
            Self::Location => a.location.cmp(&b.location),
            Self::VoltageLevel => a.voltage_level.cmp(&b.voltage_level),
            Self::WeightFactor => a.weight_factor.total_cmp(&b.weight_factor),
            Self::Count(t) => a.counts.get(t).cmp(&b.counts.get(t)),
        }
    }
}

/// Stable sort; ties keep their incoming order.
pub fn sort_data_points(points: &mut [SarfiDataPoint], sort: DataPointSort) {
    points.sort_by(|a, b| {
        let ord = sort.field.compare(a, b);
        match sort.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
}

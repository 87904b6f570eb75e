/// Membership of a meter in a profile, with its weighting factor.
///
/// A missing row means the meter does not take part in the profile. A row
/// whose `weight_factor` is absent or not strictly positive still takes part,
/// weighted as 1.0 (see [`Weight::effective_factor`]).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weight {
    pub profile_id: String,
    pub meter_id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub weight_factor: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub notes: Option<String>,
}

impl Weight {
    pub fn effective_factor(&self) -> f64 {
        match self.weight_factor {
            Some(w) if w.is_finite() && w > 0.0 => w,
            _ => 1.0,
        }
    }
}

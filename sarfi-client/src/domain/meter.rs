pub const UNKNOWN_VOLTAGE_LEVEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Meter {
    pub meter_id: String,
    pub display_code: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub location: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub voltage_level: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub substation_voltage_level: Option<String>,
}

impl Meter {
    /// The meter's own voltage level, else its substation's, else `"Unknown"`.
    pub fn effective_voltage_level(&self) -> &str {
        self.voltage_level
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                self.substation_voltage_level
                    .as_deref()
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or(UNKNOWN_VOLTAGE_LEVEL)
    }
}

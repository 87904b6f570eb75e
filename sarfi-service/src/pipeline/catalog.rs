use std::{
    collections::{BTreeSet, HashMap, HashSet},
    time::Duration,
};

use sarfi_client::domain::Meter;

use super::{fetch_stage, FetchStage, MeterSource, SarfiError};

/// Metadata of the weighted meters that still exist, keyed by meter id.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCatalog {
    meters: HashMap<String, Meter>,
}

impl ResolvedCatalog {
    pub fn from_meters<I>(meters: I) -> Self
    where
        I: IntoIterator<Item = Meter>,
    {
        Self {
            meters: meters.into_iter().map(|m| (m.meter_id.clone(), m)).collect(),
        }
    }

    pub fn get(&self, meter_id: &str) -> Option<&Meter> {
        self.meters.get(meter_id)
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Distinct effective voltage levels, sorted.
    pub fn voltage_levels(&self) -> Vec<String> {
        self.meters
            .values()
            .map(|m| m.effective_voltage_level().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Look up metadata for `meter_ids`. Ids the store does not know are left
/// out of the catalog rather than failing the run.
pub async fn resolve_meters<M>(
    source: &M,
    meter_ids: &[String],
    timeout: Option<Duration>,
) -> Result<ResolvedCatalog, SarfiError>
where
    M: MeterSource + ?Sized,
{
    if meter_ids.is_empty() {
        return Ok(ResolvedCatalog::default());
    }

    let rows = fetch_stage(FetchStage::Meters, timeout, source.get_meters(meter_ids)).await?;
    let requested: HashSet<&str> = meter_ids.iter().map(String::as_str).collect();
    let catalog = ResolvedCatalog::from_meters(
        rows.into_iter()
            .filter(|m| requested.contains(m.meter_id.as_str())),
    );

    let missing = meter_ids.len().saturating_sub(catalog.len());
    if missing > 0 {
        tracing::debug!(
            requested = meter_ids.len(),
            missing,
            "weighted meters missing from catalog were excluded"
        );
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter(id: &str, level: Option<&str>, substation: Option<&str>) -> Meter {
        Meter {
            meter_id: id.to_string(),
            display_code: id.to_uppercase(),
            location: None,
            voltage_level: level.map(str::to_string),
            substation_voltage_level: substation.map(str::to_string),
        }
    }

    struct Catalog(Vec<Meter>);

    #[async_trait::async_trait]
    impl MeterSource for Catalog {
        async fn get_meters(&self, meter_ids: &[String]) -> anyhow::Result<Vec<Meter>> {
            Ok(self
                .0
                .iter()
                .filter(|m| meter_ids.contains(&m.meter_id))
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn unknown_meters_are_dropped_silently() {
        let store = Catalog(vec![meter("m-1", Some("11kV"), None)]);
        let ids = vec!["m-1".to_string(), "decommissioned".to_string()];

        let catalog = resolve_meters(&store, &ids, None).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("m-1").is_some());
        assert!(catalog.get("decommissioned").is_none());
    }

    #[tokio::test]
    async fn empty_id_set_resolves_to_empty_catalog() {
        let store = Catalog(vec![meter("m-1", None, None)]);
        let catalog = resolve_meters(&store, &[], None).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn voltage_levels_are_distinct_and_resolved() {
        let catalog = ResolvedCatalog::from_meters(vec![
            meter("a", Some("33kV"), None),
            meter("b", None, Some("11kV")),
            meter("c", None, None),
            meter("d", Some("33kV"), Some("11kV")),
        ]);
        assert_eq!(catalog.voltage_levels(), vec!["11kV", "33kV", "Unknown"]);
    }
}

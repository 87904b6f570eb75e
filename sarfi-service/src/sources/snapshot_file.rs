use std::{collections::HashSet, path::Path, sync::Arc};

use sarfi_client::domain::{EventQuery, Meter, Profile, VoltageDipEvent, Weight};
use serde::Deserialize;

use crate::pipeline::{EventSource, MeterSource, ProfileSource, WeightSource};

/// A frozen export of the store, for offline runs and reproducible reports.
///
/// Expected layout (every list may be omitted):
///
/// ```json
/// { "profiles": [...], "weights": [...], "meters": [...], "events": [...] }
/// ```
///
/// Events use RFC 3339 timestamps in `ts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub weights: Vec<Weight>,
    #[serde(default)]
    pub meters: Vec<Meter>,
    #[serde(default)]
    pub events: Vec<VoltageDipEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<Snapshot>,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(snapshot),
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Ok(Self::new(snapshot))
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read snapshot {}: {e}", path.display()))?;
        let store = Self::from_json(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse snapshot {}: {e}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            profiles = store.inner.profiles.len(),
            weights = store.inner.weights.len(),
            meters = store.inner.meters.len(),
            events = store.inner.events.len(),
            "snapshot loaded"
        );
        Ok(store)
    }
}

#[async_trait::async_trait]
impl ProfileSource for SnapshotStore {
    async fn list_profiles(&self, active_only: bool) -> anyhow::Result<Vec<Profile>> {
        let mut rows: Vec<Profile> = self
            .inner
            .profiles
            .iter()
            .filter(|p| !active_only || p.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.name.cmp(&b.name)));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl WeightSource for SnapshotStore {
    async fn list_weights(&self, profile_id: &str) -> anyhow::Result<Vec<Weight>> {
        Ok(self
            .inner
            .weights
            .iter()
            .filter(|w| w.profile_id == profile_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl MeterSource for SnapshotStore {
    async fn get_meters(&self, meter_ids: &[String]) -> anyhow::Result<Vec<Meter>> {
        let wanted: HashSet<&str> = meter_ids.iter().map(String::as_str).collect();
        Ok(self
            .inner
            .meters
            .iter()
            .filter(|m| wanted.contains(m.meter_id.as_str()))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl EventSource for SnapshotStore {
    async fn list_events(&self, query: &EventQuery) -> anyhow::Result<Vec<VoltageDipEvent>> {
        let matcher = query.matcher();
        Ok(self
            .inner
            .events
            .iter()
            .filter(|e| matcher.matches(e))
            .cloned()
            .collect())
    }
}

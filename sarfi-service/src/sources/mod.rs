pub mod questdb;
pub mod snapshot_file;

pub use questdb::QuestDbStore;
pub use snapshot_file::{Snapshot, SnapshotStore};

use sarfi_client::domain::{EventQuery, Meter, Profile, VoltageDipEvent, Weight};
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::{AppConfig, StoreKind},
    pipeline::{EventSource, MeterSource, ProfileSource, WeightSource},
};

/// The store selected by `[store] kind`.
#[derive(Clone)]
pub enum ConfiguredStore {
    QuestDb(QuestDbStore),
    Snapshot(SnapshotStore),
}

impl ConfiguredStore {
    pub async fn connect(cfg: &AppConfig) -> anyhow::Result<Self> {
        match cfg.store.kind {
            StoreKind::Pgwire => {
                let questdb = cfg
                    .questdb
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("missing [questdb] section"))?;
                let pool = PgPoolOptions::new()
                    .max_connections(questdb.max_connections)
                    .connect(&questdb.uri)
                    .await?;
                Ok(Self::QuestDb(QuestDbStore::new(
                    pool,
                    cfg.fetch.max_retries,
                    cfg.fetch.retry_backoff(),
                )))
            }
            StoreKind::Snapshot => {
                let path = cfg
                    .store
                    .snapshot_path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("missing store.snapshot_path"))?;
                Ok(Self::Snapshot(SnapshotStore::load(path).await?))
            }
        }
    }
}

#[async_trait::async_trait]
impl ProfileSource for ConfiguredStore {
    async fn list_profiles(&self, active_only: bool) -> anyhow::Result<Vec<Profile>> {
        match self {
            Self::QuestDb(s) => s.list_profiles(active_only).await,
            Self::Snapshot(s) => s.list_profiles(active_only).await,
        }
    }
}

#[async_trait::async_trait]
impl WeightSource for ConfiguredStore {
    async fn list_weights(&self, profile_id: &str) -> anyhow::Result<Vec<Weight>> {
        match self {
            Self::QuestDb(s) => s.list_weights(profile_id).await,
            Self::Snapshot(s) => s.list_weights(profile_id).await,
        }
    }
}

#[async_trait::async_trait]
impl MeterSource for ConfiguredStore {
    async fn get_meters(&self, meter_ids: &[String]) -> anyhow::Result<Vec<Meter>> {
        match self {
            Self::QuestDb(s) => s.get_meters(meter_ids).await,
            Self::Snapshot(s) => s.get_meters(meter_ids).await,
        }
    }
}

#[async_trait::async_trait]
impl EventSource for ConfiguredStore {
    async fn list_events(&self, query: &EventQuery) -> anyhow::Result<Vec<VoltageDipEvent>> {
        match self {
            Self::QuestDb(s) => s.list_events(query).await,
            Self::Snapshot(s) => s.list_events(query).await,
        }
    }
}

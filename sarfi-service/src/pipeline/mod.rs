use std::{
    future::Future,
    time::{Duration, Instant},
};

use sarfi_client::domain::{EventQuery, Meter, Profile, VoltageDipEvent, Weight};
use tokio_util::sync::CancellationToken;

use crate::aggregate::{self, SarfiReport};

pub mod catalog;
pub mod filters;
pub mod weights;

pub use filters::{SarfiFilters, VoltageLevelFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Profiles,
    Weights,
    Meters,
    Events,
}

impl FetchStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Weights => "weights",
            Self::Meters => "meters",
            Self::Events => "events",
        }
    }
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SarfiError {
    #[error("{stage} fetch failed: {source}")]
    Fetch {
        stage: FetchStage,
        #[source]
        source: anyhow::Error,
    },
    #[error("{stage} fetch timed out after {timeout:?}")]
    Timeout { stage: FetchStage, timeout: Duration },
    #[error("sarfi computation cancelled")]
    Cancelled,
}

#[async_trait::async_trait]
pub trait ProfileSource: Send + Sync {
    async fn list_profiles(&self, active_only: bool) -> anyhow::Result<Vec<Profile>>;
}

#[async_trait::async_trait]
pub trait WeightSource: Send + Sync {
    async fn list_weights(&self, profile_id: &str) -> anyhow::Result<Vec<Weight>>;
}

#[async_trait::async_trait]
pub trait MeterSource: Send + Sync {
    async fn get_meters(&self, meter_ids: &[String]) -> anyhow::Result<Vec<Meter>>;
}

#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn list_events(&self, query: &EventQuery) -> anyhow::Result<Vec<VoltageDipEvent>>;
}

/// Run one read against a store, tagging failures with the stage and
/// enforcing the optional per-fetch timeout.
pub(crate) async fn fetch_stage<T, F>(
    stage: FetchStage,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, SarfiError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let res = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => {
                tracing::error!(stage = %stage, timeout_ms = limit.as_millis() as u64, "sarfi fetch timed out");
                metrics::counter!("sarfi_fetch_errors_total", "stage" => stage.as_str()).increment(1);
                return Err(SarfiError::Timeout { stage, timeout: limit });
            }
        },
        None => fut.await,
    };

    res.map_err(|e| {
        tracing::error!(error = %e, stage = %stage, "sarfi fetch failed");
        metrics::counter!("sarfi_fetch_errors_total", "stage" => stage.as_str()).increment(1);
        SarfiError::Fetch { stage, source: e }
    })
}

/// Weighted SARFI computation over three read-only stores.
pub struct SarfiPipeline<W, M, E> {
    pub weights: W,
    pub meters: M,
    pub events: E,
    pub fetch_timeout: Option<Duration>,
}

impl<S: Clone> SarfiPipeline<S, S, S> {
    /// Pipeline whose three reads all go to the same store.
    pub fn from_store(store: S, fetch_timeout: Option<Duration>) -> Self {
        Self {
            weights: store.clone(),
            meters: store.clone(),
            events: store,
            fetch_timeout,
        }
    }
}

impl<W, M, E> SarfiPipeline<W, M, E>
where
    W: WeightSource,
    M: MeterSource,
    E: EventSource,
{
    pub async fn compute_weighted_sarfi(
        &self,
        profile_id: &str,
        filters: &SarfiFilters,
    ) -> Result<SarfiReport, SarfiError> {
        let started = Instant::now();
        metrics::counter!("sarfi_runs_total").increment(1);

        let weights = weights::load_weight_table(&self.weights, profile_id, self.fetch_timeout).await?;
        if weights.is_empty() {
            return Ok(SarfiReport::default());
        }

        // Events are requested for every weighted meter; those that fail
        // metadata resolution are dropped while counting.
        let meter_ids = weights::meter_ids(&weights);
        let query = filters.event_query(meter_ids.clone());

        let (catalog, events) = tokio::try_join!(
            catalog::resolve_meters(&self.meters, &meter_ids, self.fetch_timeout),
            fetch_stage(FetchStage::Events, self.fetch_timeout, self.events.list_events(&query)),
        )?;

        let aggregation = aggregate::aggregate(&weights, &catalog, &events);
        if aggregation.unmapped_events > 0 {
            metrics::counter!("sarfi_unmapped_events_total").increment(aggregation.unmapped_events as u64);
            tracing::debug!(
                profile_id,
                unmapped = aggregation.unmapped_events,
                "events without a resolved meter were skipped"
            );
        }

        let report = aggregation.report;
        metrics::histogram!("sarfi_compute_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            profile_id,
            voltage_level = %filters.voltage_level,
            exclude_special_events = filters.exclude_special_events,
            meters = report.per_meter.len(),
            events = events.len(),
            total_weight = report.summary.total_weight,
            "weighted sarfi computed"
        );

        Ok(report)
    }

    /// Distinct effective voltage levels of the profile's resolved meters,
    /// for populating a voltage-level selector.
    pub async fn voltage_levels(&self, profile_id: &str) -> Result<Vec<String>, SarfiError> {
        let weights = weights::load_weight_table(&self.weights, profile_id, self.fetch_timeout).await?;
        let meter_ids = weights::meter_ids(&weights);
        let catalog = catalog::resolve_meters(&self.meters, &meter_ids, self.fetch_timeout).await?;
        Ok(catalog.voltage_levels())
    }

    /// Same as [`Self::compute_weighted_sarfi`], aborting as soon as `cancel`
    /// fires. In-flight reads are dropped and no partial report is returned.
    pub async fn compute_with_cancel(
        &self,
        profile_id: &str,
        filters: &SarfiFilters,
        cancel: &CancellationToken,
    ) -> Result<SarfiReport, SarfiError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(profile_id, "sarfi computation cancelled");
                Err(SarfiError::Cancelled)
            }
            res = self.compute_weighted_sarfi(profile_id, filters) => res,
        }
    }
}

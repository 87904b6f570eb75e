use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::{
    aggregate::{sort_data_points, DataPointSort, SarfiReport, SortFieldError, SortOrder},
    pipeline::{
        fetch_stage, EventSource, FetchStage, MeterSource, ProfileSource, SarfiError, SarfiFilters,
        SarfiPipeline, VoltageLevelFilter, WeightSource,
    },
};

/// Everything the HTTP surface reads from.
pub trait SarfiStore:
    ProfileSource + WeightSource + MeterSource + EventSource + Clone + 'static
{
}

impl<T> SarfiStore for T where
    T: ProfileSource + WeightSource + MeterSource + EventSource + Clone + 'static
{
}

pub struct ApiState<S> {
    pub pipeline: Arc<SarfiPipeline<S, S, S>>,
    pub store: S,
    pub defaults: SarfiFilters,
    pub shutdown: CancellationToken,
}

impl<S: Clone> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            store: self.store.clone(),
            defaults: self.defaults.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

pub fn router<S: SarfiStore>(state: ApiState<S>) -> Router {
    Router::new()
        .route("/sarfi", get(sarfi_handler::<S>))
        .route("/profiles", get(profiles_handler::<S>))
        .route("/voltage-levels", get(voltage_levels_handler::<S>))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Sarfi(SarfiError),
}

impl From<SarfiError> for ApiError {
    fn from(e: SarfiError) -> Self {
        Self::Sarfi(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<SortFieldError> for ApiError {
    fn from(e: SortFieldError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Sarfi(SarfiError::Fetch { .. }) => StatusCode::BAD_GATEWAY,
            Self::Sarfi(SarfiError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Sarfi(SarfiError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Sarfi(e) => e.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SarfiParams {
    pub profile_id: Option<String>,
    pub voltage_level: Option<String>,
    pub exclude_special_events: Option<bool>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end: Option<OffsetDateTime>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl SarfiParams {
    /// Request filters, falling back to `defaults` for anything left out.
    pub fn filters(&self, defaults: &SarfiFilters) -> SarfiFilters {
        SarfiFilters {
            voltage_level: self
                .voltage_level
                .clone()
                .map(VoltageLevelFilter::from)
                .unwrap_or_else(|| defaults.voltage_level.clone()),
            exclude_special_events: self
                .exclude_special_events
                .unwrap_or(defaults.exclude_special_events),
            start: self.start.or(defaults.start),
            end: self.end.or(defaults.end),
        }
    }

    pub fn sort(&self) -> Result<Option<DataPointSort>, SortFieldError> {
        let Some(field) = &self.sort else {
            return Ok(None);
        };
        let order = match &self.order {
            Some(o) => o.parse()?,
            None => SortOrder::default(),
        };
        Ok(Some(DataPointSort {
            field: field.parse()?,
            order,
        }))
    }
}

#[derive(Debug, Serialize)]
pub struct SarfiResponse {
    pub profile_id: String,
    pub filters: SarfiFilters,
    pub fingerprint: String,
    #[serde(flatten)]
    pub report: SarfiReport,
}

pub async fn sarfi_handler<S: SarfiStore>(
    State(state): State<ApiState<S>>,
    params: Result<Query<SarfiParams>, QueryRejection>,
) -> Result<Json<SarfiResponse>, ApiError> {
    let Query(params) = params?;
    let sort = params.sort()?;
    let filters = params.filters(&state.defaults);
    let profile_id = params.profile_id.clone().unwrap_or_default();

    let mut report = state
        .pipeline
        .compute_with_cancel(&profile_id, &filters, &state.shutdown)
        .await?;

    // Fingerprint the canonical (weight-row) order so sorting does not change it.
    let fingerprint = report.fingerprint();
    if let Some(sort) = sort {
        sort_data_points(&mut report.per_meter, sort);
    }

    Ok(Json(SarfiResponse {
        profile_id,
        filters,
        fingerprint,
        report,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfilesParams {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn profiles_handler<S: SarfiStore>(
    State(state): State<ApiState<S>>,
    params: Result<Query<ProfilesParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let profiles = fetch_stage(
        FetchStage::Profiles,
        state.pipeline.fetch_timeout,
        state.store.list_profiles(params.active_only),
    )
    .await?;
    Ok(Json(profiles).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct VoltageLevelsParams {
    pub profile_id: Option<String>,
}

pub async fn voltage_levels_handler<S: SarfiStore>(
    State(state): State<ApiState<S>>,
    params: Result<Query<VoltageLevelsParams>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(params) = params?;
    let profile_id = params.profile_id.unwrap_or_default();
    let levels = state.pipeline.voltage_levels(&profile_id).await?;
    Ok(Json(levels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SnapshotStore;
    use axum::http::{header, Uri};
    use time::macros::datetime;

    const SNAPSHOT: &str = r#"{
        "profiles": [
            { "id": "tpc-2024", "name": "Transmission 2024", "year": 2024, "is_active": true },
            { "id": "tpc-2023", "name": "Transmission 2023", "year": 2023, "is_active": false }
        ],
        "weights": [
            { "profile_id": "tpc-2024", "meter_id": "m-1", "weight_factor": 1.0 },
            { "profile_id": "tpc-2024", "meter_id": "m-2", "weight_factor": 2.0 }
        ],
        "meters": [
            { "meter_id": "m-1", "display_code": "PQ-001", "voltage_level": "161kV" },
            { "meter_id": "m-2", "display_code": "PQ-002", "substation_voltage_level": "69kV" }
        ],
        "events": [
            { "id": 1, "ts": "2024-08-01T03:00:00Z", "meter_id": "m-2", "event_type": "voltage_dip", "voltage_level": "69kV", "remaining_voltage": 25.0 },
            { "id": 2, "ts": "2024-08-02T03:00:00Z", "meter_id": "m-2", "event_type": "voltage_dip", "voltage_level": "69kV", "remaining_voltage": 55.0, "is_special_event": true }
        ]
    }"#;

    fn state() -> ApiState<SnapshotStore> {
        let store = SnapshotStore::from_json(SNAPSHOT).unwrap();
        ApiState {
            pipeline: Arc::new(SarfiPipeline::from_store(store.clone(), None)),
            store,
            defaults: SarfiFilters {
                exclude_special_events: true,
                ..SarfiFilters::default()
            },
            shutdown: CancellationToken::new(),
        }
    }

    fn params(profile_id: &str) -> SarfiParams {
        SarfiParams {
            profile_id: Some(profile_id.to_string()),
            ..SarfiParams::default()
        }
    }

    #[test]
    fn params_override_defaults_field_by_field() {
        let defaults = SarfiFilters {
            voltage_level: VoltageLevelFilter::from("161kV"),
            exclude_special_events: true,
            start: Some(datetime!(2024-01-01 00:00:00 UTC)),
            end: None,
        };
        let p = SarfiParams {
            voltage_level: Some("All".to_string()),
            ..SarfiParams::default()
        };

        let f = p.filters(&defaults);
        assert_eq!(f.voltage_level, VoltageLevelFilter::All);
        assert!(f.exclude_special_events);
        assert_eq!(f.start, defaults.start);
    }

    #[test]
    fn sort_params_are_validated() {
        let mut p = SarfiParams {
            sort: Some("sarfi_50".to_string()),
            order: Some("desc".to_string()),
            ..SarfiParams::default()
        };
        assert!(matches!(p.sort(), Ok(Some(DataPointSort { order: SortOrder::Descending, .. }))));

        p.sort = Some("kwh".to_string());
        let err = ApiError::from(p.sort().unwrap_err());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        assert!(matches!(SarfiParams::default().sort(), Ok(None)));
    }

    #[test]
    fn fetch_errors_map_to_gateway_statuses() {
        let fetch = ApiError::from(SarfiError::Fetch {
            stage: FetchStage::Events,
            source: anyhow::anyhow!("boom"),
        });
        assert_eq!(fetch.status(), StatusCode::BAD_GATEWAY);

        let timeout = ApiError::from(SarfiError::Timeout {
            stage: FetchStage::Meters,
            timeout: std::time::Duration::from_secs(1),
        });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn sarfi_endpoint_applies_config_defaults() {
        let Json(body) = sarfi_handler(State(state()), Ok(Query(params("tpc-2024"))))
            .await
            .unwrap();

        // The special event is excluded by the configured default.
        assert_eq!(body.report.per_meter[1].counts.sarfi_10, 1);
        assert_eq!(body.report.per_meter[1].counts.sarfi_30, 1);
        assert_eq!(body.report.summary.total_weight, 3.0);
        assert_eq!(body.fingerprint, body.report.fingerprint());
    }

    #[tokio::test]
    async fn sorting_keeps_fingerprint_of_canonical_order() {
        let Json(plain) = sarfi_handler(State(state()), Ok(Query(params("tpc-2024"))))
            .await
            .unwrap();

        let sorted_params = SarfiParams {
            sort: Some("sarfi_10".to_string()),
            order: Some("desc".to_string()),
            ..params("tpc-2024")
        };
        let Json(sorted) = sarfi_handler(State(state()), Ok(Query(sorted_params)))
            .await
            .unwrap();

        assert_eq!(sorted.report.per_meter[0].meter_id, "m-2");
        assert_eq!(plain.fingerprint, sorted.fingerprint);
    }

    #[tokio::test]
    async fn missing_profile_returns_empty_report() {
        let Json(body) = sarfi_handler(State(state()), Ok(Query(SarfiParams::default())))
            .await
            .unwrap();
        assert!(body.report.per_meter.is_empty());
        assert_eq!(body.profile_id, "");
    }

    #[tokio::test]
    async fn shutdown_cancels_requests() {
        let s = state();
        s.shutdown.cancel();

        let err = sarfi_handler(State(s), Ok(Query(params("tpc-2024"))))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn voltage_levels_for_profile() {
        let Json(levels) = voltage_levels_handler(
            State(state()),
            Ok(Query(VoltageLevelsParams {
                profile_id: Some("tpc-2024".to_string()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(levels, vec!["161kV", "69kV"]);
    }

    #[tokio::test]
    async fn malformed_query_gets_json_error_body() {
        let uri: Uri = "/sarfi?profile_id=tpc-2024&start=yesterday".parse().unwrap();
        let err = sarfi_handler(State(state()), Query::try_from_uri(&uri))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );

        let uri: Uri = "/sarfi?exclude_special_events=maybe".parse().unwrap();
        let err = sarfi_handler(State(state()), Query::try_from_uri(&uri))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}

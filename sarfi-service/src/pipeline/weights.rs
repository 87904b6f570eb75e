use std::{collections::HashSet, time::Duration};

use sarfi_client::domain::Weight;

use super::{fetch_stage, FetchStage, SarfiError, WeightSource};

/// Weight rows of `profile_id` in insertion order.
///
/// A blank profile id means nothing is selected: the result is empty and the
/// store is not called.
pub async fn load_weight_table<W>(
    source: &W,
    profile_id: &str,
    timeout: Option<Duration>,
) -> Result<Vec<Weight>, SarfiError>
where
    W: WeightSource + ?Sized,
{
    if profile_id.trim().is_empty() {
        tracing::debug!("no profile selected");
        return Ok(Vec::new());
    }

    let rows = fetch_stage(FetchStage::Weights, timeout, source.list_weights(profile_id)).await?;
    if rows.is_empty() {
        tracing::info!(profile_id, "profile has no weight rows, nothing to aggregate");
    }

    Ok(rows)
}

/// Distinct meter ids in first-seen order.
pub fn meter_ids(weights: &[Weight]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(weights.len());
    weights
        .iter()
        .filter(|w| seen.insert(w.meter_id.as_str()))
        .map(|w| w.meter_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(meter_id: &str) -> Weight {
        Weight {
            profile_id: "p".to_string(),
            meter_id: meter_id.to_string(),
            weight_factor: None,
            notes: None,
        }
    }

    struct Rows(Vec<Weight>);

    #[async_trait::async_trait]
    impl WeightSource for Rows {
        async fn list_weights(&self, profile_id: &str) -> anyhow::Result<Vec<Weight>> {
            Ok(self
                .0
                .iter()
                .filter(|w| w.profile_id == profile_id)
                .cloned()
                .collect())
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl WeightSource for Broken {
        async fn list_weights(&self, _profile_id: &str) -> anyhow::Result<Vec<Weight>> {
            anyhow::bail!("relation sarfi_weights does not exist")
        }
    }

    #[test]
    fn meter_ids_are_distinct_and_ordered() {
        let rows = vec![weight("b"), weight("a"), weight("b"), weight("c")];
        assert_eq!(meter_ids(&rows), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn returns_rows_in_store_order() {
        let store = Rows(vec![weight("b"), weight("a")]);
        let rows = load_weight_table(&store, "p", None).await.unwrap();
        assert_eq!(meter_ids(&rows), vec!["b", "a"]);

        assert!(load_weight_table(&store, "other", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_tagged_with_weights_stage() {
        let err = load_weight_table(&Broken, "p", None).await.unwrap_err();
        assert!(matches!(err, SarfiError::Fetch { stage: FetchStage::Weights, .. }));
    }

    #[tokio::test]
    async fn blank_profile_short_circuits() {
        // `Broken` would fail if it were called.
        assert!(load_weight_table(&Broken, "", None).await.unwrap().is_empty());
    }
}

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::{EventQuery, Meter, Profile, VoltageDipEvent, Weight, VOLTAGE_DIP};

/// List SARFI profiles, newest year first.
pub async fn list_profiles(pool: &PgPool, active_only: bool) -> Result<Vec<Profile>> {
    let rows = sqlx::query_as::<_, Profile>(
        r#"
        SELECT
            id,
            name,
            year,
            is_active
        FROM sarfi_profiles
        WHERE ($1 = FALSE OR is_active = TRUE)
        ORDER BY year DESC, name
        "#,
    )
    .bind(active_only)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Weight rows of one profile, in insertion order.
pub async fn list_weights(pool: &PgPool, profile_id: &str) -> Result<Vec<Weight>> {
    let rows = sqlx::query_as::<_, Weight>(
        r#"
        SELECT
            profile_id,
            meter_id,
            weight_factor,
            notes
        FROM sarfi_weights
        WHERE profile_id = $1
        ORDER BY created_at, meter_id
        "#,
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Meter metadata for the given ids. Ids with no meter row are simply absent
/// from the result.
pub async fn get_meters(pool: &PgPool, meter_ids: &[String]) -> Result<Vec<Meter>> {
    if meter_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, Meter>(
        r#"
        SELECT
            m.meter_id,
            m.display_code,
            m.location,
            m.voltage_level,
            s.voltage_level AS substation_voltage_level
        FROM meters m
        LEFT JOIN substations s ON s.substation_id = m.substation_id
        WHERE m.meter_id = ANY($1)
        ORDER BY m.meter_id
        "#,
    )
    .bind(meter_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Voltage-dip events matching `query`. Mirrors [`EventQuery::matches`].
pub async fn list_events(pool: &PgPool, query: &EventQuery) -> Result<Vec<VoltageDipEvent>> {
    if query.meter_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        r#"
        SELECT
            id,
            ts,
            meter_id,
            event_type,
            voltage_level,
            is_special_event,
            remaining_voltage,
            magnitude
        FROM pq_events
        WHERE event_type = "#,
    );
    builder.push_bind(VOLTAGE_DIP);

    builder.push(" AND meter_id = ANY(");
    builder.push_bind(query.meter_ids.clone());
    builder.push(")");

    if let Some(level) = &query.voltage_level {
        builder.push(" AND voltage_level = ");
        builder.push_bind(level.clone());
    }

    // NULL counts as not special.
    if query.exclude_special {
        builder.push(" AND (is_special_event IS NULL OR is_special_event = FALSE)");
    }

    if let Some(start) = query.start {
        builder.push(" AND ts >= ");
        builder.push_bind(start);
    }
    if let Some(end) = query.end {
        builder.push(" AND ts < ");
        builder.push_bind(end);
    }

    builder.push(" ORDER BY ts, id");

    let rows = builder
        .build_query_as::<VoltageDipEvent>()
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

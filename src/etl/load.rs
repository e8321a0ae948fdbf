/// Load Module
///
/// Turns one chunk of extracted records into a single conflict-safe batch
/// upsert against the fact table.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::etl::dimensions::{resolve_aircraft, resolve_countries, DimensionCache};
use crate::etl::{ChunkOutcome, EtlError};
use crate::models::RawPositionRecord;

/// Multi-row upsert keyed by (aircraft_id, api_timestamp). A later load of
/// the same key overwrites the mutable fields and bumps processed_time.
const FACT_UPSERT_SQL: &str = r#"
INSERT INTO fact_flight_positions (
    aircraft_id, country_id, callsign, longitude, latitude,
    geo_altitude, velocity, true_track, on_ground,
    api_timestamp, ingestion_time
)
SELECT * FROM UNNEST(
    $1::INT4[], $2::INT4[], $3::TEXT[], $4::FLOAT8[], $5::FLOAT8[],
    $6::FLOAT8[], $7::FLOAT8[], $8::FLOAT8[], $9::BOOL[],
    $10::TIMESTAMPTZ[], $11::TIMESTAMPTZ[]
)
ON CONFLICT (aircraft_id, api_timestamp)
DO UPDATE SET
    country_id = EXCLUDED.country_id,
    callsign = EXCLUDED.callsign,
    longitude = EXCLUDED.longitude,
    latitude = EXCLUDED.latitude,
    geo_altitude = EXCLUDED.geo_altitude,
    velocity = EXCLUDED.velocity,
    true_track = EXCLUDED.true_track,
    on_ground = EXCLUDED.on_ground,
    ingestion_time = EXCLUDED.ingestion_time,
    processed_time = NOW()
"#;

/// Column arrays for the multi-row fact upsert. Index i across all vectors
/// describes one fact row; UNNEST preserves this order.
#[derive(Debug, Default)]
struct FactColumns {
    aircraft_ids: Vec<i32>,
    country_ids: Vec<Option<i32>>,
    callsigns: Vec<Option<String>>,
    longitudes: Vec<f64>,
    latitudes: Vec<f64>,
    geo_altitudes: Vec<Option<f64>>,
    velocities: Vec<Option<f64>>,
    true_tracks: Vec<Option<f64>>,
    on_ground_flags: Vec<bool>,
    api_timestamps: Vec<DateTime<Utc>>,
    ingestion_times: Vec<DateTime<Utc>>,
}

impl FactColumns {
    fn len(&self) -> usize {
        self.aircraft_ids.len()
    }

    fn is_empty(&self) -> bool {
        self.aircraft_ids.is_empty()
    }
}

/// Build the column arrays for `records`, preserving supplied order.
///
/// Records whose aircraft key is absent from `aircraft` (blank or
/// unresolved) cannot satisfy the foreign-key invariant; records whose
/// source timestamp is unrepresentable cannot satisfy the conflict key.
/// Both are dropped and counted, not errors. A missing or unresolved
/// country simply leaves country_id null.
fn build_fact_columns(
    records: &[RawPositionRecord],
    aircraft: &HashMap<String, i32>,
    countries: &HashMap<String, i32>,
) -> (FactColumns, usize) {
    let mut columns = FactColumns::default();
    let mut skipped = 0;

    for record in records {
        let Some(&aircraft_id) = aircraft.get(&record.icao24) else {
            skipped += 1;
            continue;
        };
        let Some(api_timestamp) = DateTime::from_timestamp(record.api_timestamp, 0) else {
            skipped += 1;
            continue;
        };

        let country_id =
            record.origin_country.as_deref().and_then(|name| countries.get(name)).copied();

        columns.aircraft_ids.push(aircraft_id);
        columns.country_ids.push(country_id);
        columns.callsigns.push(record.callsign.clone());
        columns.longitudes.push(record.longitude);
        columns.latitudes.push(record.latitude);
        columns.geo_altitudes.push(record.geo_altitude);
        columns.velocities.push(record.velocity);
        columns.true_tracks.push(record.true_track);
        columns.on_ground_flags.push(record.on_ground);
        columns.api_timestamps.push(api_timestamp);
        columns.ingestion_times.push(record.ingestion_time);
    }

    (columns, skipped)
}

/// Upsert one chunk of records into the fact table.
///
/// Dimension resolution and the fact write share one transaction: the
/// chunk fully lands or fully rolls back, and no half-applied chunk is
/// ever visible to readers. Any storage error rolls the chunk back and
/// surfaces as zero processed; the caller does not retry within the cycle.
pub async fn load_chunk(
    pool: &PgPool,
    cache: &DimensionCache,
    records: &[RawPositionRecord],
) -> Result<ChunkOutcome, EtlError> {
    if records.is_empty() {
        return Ok(ChunkOutcome::default());
    }

    let mut tx = pool.begin().await.map_err(EtlError::Load)?;

    let icao24s: Vec<String> = records.iter().map(|record| record.icao24.clone()).collect();
    let country_names: Vec<String> =
        records.iter().filter_map(|record| record.origin_country.clone()).collect();

    let aircraft_map = resolve_aircraft(&mut tx, cache, &icao24s).await?;
    let country_map = resolve_countries(&mut tx, cache, &country_names).await?;

    let (columns, skipped) = build_fact_columns(records, &aircraft_map, &country_map);

    if !columns.is_empty() {
        sqlx::query(FACT_UPSERT_SQL)
            .bind(&columns.aircraft_ids)
            .bind(&columns.country_ids)
            .bind(&columns.callsigns)
            .bind(&columns.longitudes)
            .bind(&columns.latitudes)
            .bind(&columns.geo_altitudes)
            .bind(&columns.velocities)
            .bind(&columns.true_tracks)
            .bind(&columns.on_ground_flags)
            .bind(&columns.api_timestamps)
            .bind(&columns.ingestion_times)
            .execute(&mut *tx)
            .await
            .map_err(EtlError::Load)?;
    }

    tx.commit().await.map_err(EtlError::Load)?;

    tracing::debug!("Chunk committed: {} upserted, {} skipped", columns.len(), skipped);
    Ok(ChunkOutcome { processed: columns.len(), skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(icao24: &str, country: Option<&str>, api_timestamp: i64) -> RawPositionRecord {
        RawPositionRecord {
            icao24: icao24.to_string(),
            callsign: Some("AFR123".to_string()),
            origin_country: country.map(|c| c.to_string()),
            longitude: 2.55,
            latitude: 49.01,
            geo_altitude: Some(10_668.0),
            velocity: Some(231.5),
            true_track: Some(184.0),
            on_ground: false,
            api_timestamp,
            ingestion_time: DateTime::from_timestamp(api_timestamp, 0).unwrap_or_default()
                + chrono::Duration::seconds(3),
        }
    }

    #[test]
    fn unresolved_aircraft_are_skipped_not_errors() {
        let records = vec![record("3c6444", Some("Germany"), 1000), record("unknown", Some("Germany"), 1001)];
        let aircraft = HashMap::from([("3c6444".to_string(), 1)]);
        let countries = HashMap::from([("Germany".to_string(), 4)]);

        let (columns, skipped) = build_fact_columns(&records, &aircraft, &countries);

        assert_eq!(columns.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(columns.aircraft_ids, vec![1]);
    }

    #[test]
    fn missing_country_loads_with_null_surrogate() {
        let records = vec![record("3c6444", None, 1000), record("ab1234", Some(""), 1001)];
        let aircraft = HashMap::from([("3c6444".to_string(), 1), ("ab1234".to_string(), 2)]);
        let countries = HashMap::new();

        let (columns, skipped) = build_fact_columns(&records, &aircraft, &countries);

        assert_eq!(skipped, 0);
        assert_eq!(columns.country_ids, vec![None, None]);
    }

    #[test]
    fn unrepresentable_source_timestamp_is_skipped() {
        let records = vec![record("3c6444", None, i64::MAX)];
        let aircraft = HashMap::from([("3c6444".to_string(), 1)]);

        let (columns, skipped) = build_fact_columns(&records, &aircraft, &HashMap::new());

        assert!(columns.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn supplied_order_is_preserved() {
        let records = vec![
            record("a1", Some("France"), 1002),
            record("a2", Some("Spain"), 1000),
            record("a3", Some("France"), 1001),
        ];
        let aircraft = HashMap::from([
            ("a1".to_string(), 10),
            ("a2".to_string(), 20),
            ("a3".to_string(), 30),
        ]);
        let countries = HashMap::from([("France".to_string(), 1), ("Spain".to_string(), 2)]);

        let (columns, _) = build_fact_columns(&records, &aircraft, &countries);

        assert_eq!(columns.aircraft_ids, vec![10, 20, 30]);
        assert_eq!(columns.country_ids, vec![Some(1), Some(2), Some(1)]);
        assert_eq!(
            columns.api_timestamps,
            vec![
                Utc.timestamp_opt(1002, 0).unwrap(),
                Utc.timestamp_opt(1000, 0).unwrap(),
                Utc.timestamp_opt(1001, 0).unwrap(),
            ]
        );
    }
}

/// Extract Module
///
/// Watermark-driven incremental extraction from the document store.
use chrono::{DateTime, Utc};

use crate::docstore::PositionStore;
use crate::etl::EtlError;
use crate::models::RawPositionRecord;

/// Fetch the next batch of records ingested strictly after `watermark`,
/// ascending by ingestion time, truncated to `batch_size`.
///
/// Read-only: a failed read leaves the watermark untouched so the same
/// window is retried on the next cycle.
pub async fn extract_batch(
    store: &PositionStore,
    watermark: DateTime<Utc>,
    batch_size: usize,
) -> Result<Vec<RawPositionRecord>, EtlError> {
    let records = store.fetch_newer_than(watermark, batch_size).await.map_err(EtlError::Extract)?;

    if !records.is_empty() {
        tracing::debug!("Extracted {} records newer than {}", records.len(), watermark);
    }

    Ok(records)
}

/// Max ingestion timestamp across a batch: the next watermark value.
pub fn max_ingestion_time(records: &[RawPositionRecord]) -> Option<DateTime<Utc>> {
    records.iter().map(|record| record.ingestion_time).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(icao24: &str, ingested_secs: i64) -> RawPositionRecord {
        RawPositionRecord {
            icao24: icao24.to_string(),
            callsign: None,
            origin_country: None,
            longitude: 2.35,
            latitude: 48.86,
            geo_altitude: None,
            velocity: None,
            true_track: None,
            on_ground: false,
            api_timestamp: ingested_secs - 5,
            ingestion_time: Utc.timestamp_opt(ingested_secs, 0).unwrap(),
        }
    }

    #[test]
    fn max_ingestion_time_of_empty_batch_is_none() {
        assert_eq!(max_ingestion_time(&[]), None);
    }

    #[test]
    fn max_ingestion_time_covers_whole_batch() {
        let records = vec![record("a1", 100), record("a2", 300), record("a3", 200)];

        assert_eq!(max_ingestion_time(&records), Some(Utc.timestamp_opt(300, 0).unwrap()));
    }
}

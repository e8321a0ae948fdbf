/// Data Models Module
///
/// This module defines the core data structures used throughout the
/// application: the raw document shape written by the ingestion poller
/// into MongoDB, which the extractor reads back in ingestion order.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single flight position report as stored in the document store.
///
/// Documents are immutable once written and uniquely keyed by
/// (icao24, api_timestamp) at the source. Longitude and latitude are
/// always present: the poller only stores positioned state vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPositionRecord {
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub geo_altitude: Option<f64>,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub on_ground: bool,
    /// Source-reported timestamp in unix seconds.
    pub api_timestamp: i64,
    /// When the ingestion poller wrote the document into the store.
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub ingestion_time: DateTime<Utc>,
}

/// Document Store Module
///
/// This module handles all interactions with the MongoDB document store
/// where the ingestion poller appends raw position reports. It wraps the
/// official driver and exposes the watermark query the extractor relies on.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, Collection};

use crate::models::RawPositionRecord;

pub struct PositionStore {
    client: Client,
    collection: Collection<RawPositionRecord>,
    namespace: String,
}

impl PositionStore {
    /// Connect to the document store and bind the positions collection.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await.context("Failed to create MongoDB client")?;
        let bound = client.database(database).collection::<RawPositionRecord>(collection);

        Ok(Self { client, collection: bound, namespace: format!("{}.{}", database, collection) })
    }

    /// The database.collection this store reads from, for display
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Test the document store connection
    pub async fn test_connection(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to ping MongoDB")?;

        Ok(())
    }

    /// Fetch records ingested strictly after `watermark`, oldest first,
    /// capped at `limit`.
    ///
    /// Ties on ingestion_time are broken by _id (insertion order) so a
    /// batch boundary never skips records written in the same instant.
    pub async fn fetch_newer_than(
        &self,
        watermark: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RawPositionRecord>, mongodb::error::Error> {
        let filter = doc! { "ingestion_time": { "$gt": bson::DateTime::from_chrono(watermark) } };

        let mut cursor = self
            .collection
            .find(filter)
            .sort(doc! { "ingestion_time": 1, "_id": 1 })
            .limit(limit as i64)
            .await?;

        let mut records = Vec::new();
        while let Some(record) = cursor.try_next().await? {
            records.push(record);
        }

        tracing::debug!("Fetched {} documents from {}", records.len(), self.namespace);
        Ok(records)
    }
}

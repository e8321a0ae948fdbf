/// Pipeline Module
///
/// Orchestrates the ETL cycle: Extract → Partition → Load → Advance,
/// with a maintenance window every Nth cycle. Chunk loads fan out to a
/// worker pool and are joined before the watermark moves.
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::sleep;

use crate::db::Database;
use crate::docstore::PositionStore;
use crate::etl::dimensions::DimensionCache;
use crate::etl::{extract, load, EtlError};
use crate::models::RawPositionRecord;

/// Per-cycle execution statistics
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub cycle: u64,
    pub extracted: usize,
    pub processed: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub chunks_failed: usize,
    pub elapsed: Duration,
}

/// Counts reported by one maintenance window
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceStats {
    pub hourly_buckets: i64,
    pub deleted_positions: i64,
}

/// Configuration for the cycle scheduler
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub workers: usize,
    pub maintenance_every: u64,
    pub retention_hours: i32,
    pub lookback_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_size: 500,
            workers: 4,
            maintenance_every: 60,
            retention_hours: 48,
            lookback_hours: 1,
        }
    }
}

/// Main ETL cycle scheduler
pub struct Pipeline {
    store: PositionStore,
    database: Database,
    cache: Arc<DimensionCache>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline instance
    pub fn new(store: PositionStore, database: Database, config: PipelineConfig) -> Self {
        Self { store, database, cache: Arc::new(DimensionCache::new()), config }
    }

    /// Run the extract/load loop until the process is terminated.
    ///
    /// The watermark lives only in this stack frame. A restart resumes
    /// from now minus the lookback window instead of an exact position,
    /// accepting a bounded re-scan; upserts make the overlap harmless.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut watermark = Utc::now() - chrono::Duration::hours(self.config.lookback_hours);
        let mut cycle: u64 = 0;

        println!("\n🚀 Starting ETL loop...");
        println!(
            "   ⏱  Interval: {}s | Batch size: {} | Workers: {}",
            self.config.interval.as_secs(),
            self.config.batch_size,
            self.config.workers
        );
        println!("   📍 Initial watermark: {}", watermark.format("%Y-%m-%d %H:%M:%S UTC"));

        loop {
            match self.run_cycle(cycle, watermark).await {
                Ok((stats, Some(next_watermark))) => {
                    // Never regress within a process lifetime.
                    if next_watermark > watermark {
                        watermark = next_watermark;
                    }

                    let now = Utc::now().format("%H:%M:%S");
                    println!(
                        "[{}] Cycle #{} | {} extracted | {} processed in {} chunks ({:.2}s)",
                        now,
                        stats.cycle,
                        stats.extracted,
                        stats.processed,
                        stats.chunks,
                        stats.elapsed.as_secs_f64()
                    );
                    if stats.skipped > 0 {
                        println!("   ⚠️  {} records skipped (unresolvable keys)", stats.skipped);
                    }
                }
                Ok((stats, None)) => {
                    let now = Utc::now().format("%H:%M:%S");
                    println!("[{}] Cycle #{} | No new data", now, stats.cycle);
                }
                Err(e) => {
                    // Transient extraction failure: the watermark is
                    // untouched and the same window is retried.
                    tracing::warn!("Cycle #{} yielded nothing: {}", cycle, e);
                }
            }

            if cycle > 0 && cycle % self.config.maintenance_every == 0 {
                self.run_maintenance().await;
            }

            cycle += 1;
            sleep(self.config.interval).await;
        }
    }

    /// Execute one extract → partition → load → advance pass.
    ///
    /// Returns the cycle stats and, when records were extracted, the next
    /// watermark: the max ingestion time over the ENTIRE batch, whether or
    /// not every chunk landed.
    async fn run_cycle(
        &self,
        cycle: u64,
        watermark: DateTime<Utc>,
    ) -> Result<(CycleStats, Option<DateTime<Utc>>), EtlError> {
        let started = Instant::now();

        let records = extract::extract_batch(&self.store, watermark, self.config.batch_size).await?;

        if records.is_empty() {
            return Ok((CycleStats { cycle, ..Default::default() }, None));
        }

        let next_watermark = extract::max_ingestion_time(&records);
        let extracted = records.len();
        let chunks = partition_chunks(records, self.config.workers);

        let mut stats = CycleStats { cycle, extracted, chunks: chunks.len(), ..Default::default() };

        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let pool = self.database.pool().clone();
            let cache = Arc::clone(&self.cache);
            handles.push(tokio::spawn(async move { load::load_chunk(&pool, &cache, &chunk).await }));
        }

        // Join barrier: every chunk settles before the watermark advances.
        for handle in handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    stats.processed += outcome.processed;
                    stats.skipped += outcome.skipped;
                }
                Ok(Err(e)) => {
                    stats.chunks_failed += 1;
                    tracing::warn!("Chunk rolled back: {}", e);
                }
                Err(e) => {
                    stats.chunks_failed += 1;
                    tracing::warn!("Chunk task failed to complete: {}", e);
                }
            }
        }

        if stats.chunks_failed > 0 {
            tracing::warn!(
                "Advancing watermark past {} failed chunk(s); their records will not be retried",
                stats.chunks_failed
            );
        }

        stats.elapsed = started.elapsed();
        Ok((stats, next_watermark))
    }

    /// Refresh rollups and prune the retention horizon.
    ///
    /// Failures are logged and never stop the next cycle.
    async fn run_maintenance(&self) {
        match self.maintenance_pass().await {
            Ok(stats) => {
                println!(
                    "   🧹 Rollup view refreshed | {} hourly buckets | {} old positions deleted",
                    stats.hourly_buckets, stats.deleted_positions
                );
            }
            Err(e) => tracing::error!("{}", e),
        }
    }

    async fn maintenance_pass(&self) -> Result<MaintenanceStats, EtlError> {
        self.database.refresh_latest_positions().await.map_err(EtlError::Maintenance)?;
        let hourly_buckets = self.database.aggregate_hourly_stats().await.map_err(EtlError::Maintenance)?;
        let deleted_positions = self
            .database
            .cleanup_old_positions(self.config.retention_hours)
            .await
            .map_err(EtlError::Maintenance)?;

        Ok(MaintenanceStats { hourly_buckets, deleted_positions })
    }
}

/// Split an ordered batch into contiguous chunks, one per worker.
///
/// The first (N mod workers) chunks take ceil(N / workers) records and the
/// rest take the floor; a batch smaller than the worker count stays a
/// single chunk. Record order is preserved within and across chunks.
fn partition_chunks(records: Vec<RawPositionRecord>, workers: usize) -> Vec<Vec<RawPositionRecord>> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = workers.max(1);
    if total < workers {
        return vec![records];
    }

    let base = total / workers;
    let extra = total % workers;

    let mut chunks = Vec::with_capacity(workers);
    let mut rest = records;
    for index in 0..workers {
        let take = base + usize::from(index < extra);
        let tail = rest.split_off(take);
        chunks.push(rest);
        rest = tail;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::extract::max_ingestion_time;
    use chrono::TimeZone;

    fn record(icao24: &str, ingested_secs: i64) -> RawPositionRecord {
        RawPositionRecord {
            icao24: icao24.to_string(),
            callsign: None,
            origin_country: Some("France".to_string()),
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

    fn batch(count: usize) -> Vec<RawPositionRecord> {
        (0..count).map(|i| record(&format!("a{i}"), 1_000 + i as i64)).collect()
    }

    #[test]
    fn partitions_250_records_into_4_balanced_chunks() {
        let chunks = partition_chunks(batch(250), 4);

        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![63, 63, 62, 62]);
    }

    #[test]
    fn small_batch_stays_a_single_chunk() {
        let chunks = partition_chunks(batch(3), 4);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 3);
    }

    #[test]
    fn one_worker_reproduces_the_single_threaded_variant() {
        let chunks = partition_chunks(batch(250), 1);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 250);
    }

    #[test]
    fn empty_batch_yields_no_chunks() {
        assert!(partition_chunks(Vec::new(), 4).is_empty());
    }

    #[test]
    fn chunks_are_contiguous_and_order_preserving() {
        let records = batch(10);
        let original: Vec<String> = records.iter().map(|r| r.icao24.clone()).collect();

        let chunks = partition_chunks(records, 3);

        let rejoined: Vec<String> =
            chunks.iter().flat_map(|c| c.iter().map(|r| r.icao24.clone())).collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn watermark_covers_records_from_failed_chunks() {
        // The watermark is computed from the full batch before any chunk
        // runs, so dropping a chunk's results cannot pull it back.
        let records = batch(8);
        let expected = max_ingestion_time(&records);

        let mut chunks = partition_chunks(records, 4);
        chunks.remove(3);
        let surviving: Vec<RawPositionRecord> = chunks.into_iter().flatten().collect();

        assert!(expected > max_ingestion_time(&surviving));
        assert_eq!(expected, Some(Utc.timestamp_opt(1_007, 0).unwrap()));
    }
}

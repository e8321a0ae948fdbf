/// ETL Pipeline Module
///
/// This module holds the Extract, Resolve, Load stages:
/// - Extract: fetch position reports newer than the watermark from MongoDB
/// - Resolve: map natural keys to warehouse surrogate keys via the cache
/// - Load: upsert resolved records into the fact table, one chunk at a time
///
/// Failures are contained to the smallest unit that can absorb them:
/// a chunk rather than a cycle, a cycle rather than the process.
pub mod dimensions;
pub mod extract;
pub mod load;

use thiserror::Error;

/// ETL failures, classified by the unit that contains them.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Transient document-store read failure. The cycle yields nothing,
    /// the watermark stays put, and the same window is retried at the
    /// next interval.
    #[error("extraction failed: {0}")]
    Extract(#[source] mongodb::error::Error),

    /// Dimension resolution failure. Aborts the owning chunk only.
    #[error("dimension resolution failed: {0}")]
    Resolve(#[source] sqlx::Error),

    /// Fact-table write failure. The owning chunk rolls back whole.
    #[error("chunk load failed: {0}")]
    Load(#[source] sqlx::Error),

    /// Maintenance step failure. Logged; never stops the main loop.
    #[error("maintenance failed: {0}")]
    Maintenance(#[source] sqlx::Error),
}

/// Per-chunk result of a load: rows upserted, and records dropped because
/// they could not satisfy the fact table's key constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkOutcome {
    pub processed: usize,
    pub skipped: usize,
}

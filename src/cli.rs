/// CLI Module
///
/// Command-line interface configuration using clap.
use clap::Parser;

/// Flight Warehouse ETL
///
/// Incrementally extract flight position reports from MongoDB and load
/// them into a dimensionally-modeled PostgreSQL warehouse
#[derive(Parser, Debug)]
#[command(name = "flight-warehouse-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Seconds to sleep between cycles
    #[arg(short = 'i', long, value_name = "SECONDS", default_value = "10")]
    pub interval: u64,

    /// Maximum records extracted per cycle
    #[arg(short = 'b', long, value_name = "SIZE", default_value = "500")]
    pub batch_size: usize,

    /// Number of concurrent chunk workers (1 reproduces the single-threaded pipeline)
    #[arg(short = 'w', long, value_name = "COUNT", default_value = "4")]
    pub workers: usize,

    /// Run rollup refresh and retention cleanup every N cycles
    #[arg(long, value_name = "CYCLES", default_value = "60")]
    pub maintenance_every: u64,

    /// Fact-table retention horizon in hours
    #[arg(long, value_name = "HOURS", default_value = "48")]
    pub retention_hours: i32,

    /// How far behind now the watermark starts after a (re)start
    #[arg(long, value_name = "HOURS", default_value = "1")]
    pub lookback_hours: i64,

    /// MongoDB connection URI (overrides MONGO_URL env var)
    #[arg(short = 'm', long, value_name = "URI")]
    pub mongo_url: Option<String>,

    /// Database connection URL (overrides DATABASE_URL env var)
    #[arg(short = 'd', long, value_name = "URL")]
    pub database_url: Option<String>,
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.workers == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if self.maintenance_every == 0 {
            anyhow::bail!("Maintenance cadence must be greater than 0");
        }

        if self.retention_hours <= 0 {
            anyhow::bail!("Retention horizon must be greater than 0");
        }

        if self.lookback_hours <= 0 {
            anyhow::bail!("Watermark lookback must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> Cli {
        Cli {
            interval: 10,
            batch_size: 500,
            workers: 4,
            maintenance_every: 60,
            retention_hours: 48,
            lookback_hours: 1,
            mongo_url: None,
            database_url: None,
        }
    }

    #[test]
    fn default_arguments_validate() {
        assert!(cli().validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut args = cli();
        args.workers = 0;

        assert!(args.validate().is_err());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut args = cli();
        args.batch_size = 0;

        assert!(args.validate().is_err());
    }

    #[test]
    fn negative_retention_is_rejected() {
        let mut args = cli();
        args.retention_hours = -1;

        assert!(args.validate().is_err());
    }
}

/// Flight Warehouse ETL
///
/// An incremental ETL pipeline moving flight position reports from a
/// MongoDB document store into a dimensionally-modeled PostgreSQL
/// warehouse.
mod cli;
mod db;
mod docstore;
mod etl;
mod models;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use db::Database;
use docstore::PositionStore;
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    cli.validate()?;

    println!("🚀 Starting Flight Warehouse ETL...");

    // Connect to the document store the ingestion poller writes into
    let mongo_url = match &cli.mongo_url {
        Some(url) => url.clone(),
        None => env::var("MONGO_URL").context("MONGO_URL not found in environment. Please check your .env file")?,
    };
    let mongo_database = env::var("MONGO_DATABASE").unwrap_or_else(|_| "flights".to_string());
    let mongo_collection = env::var("MONGO_COLLECTION").unwrap_or_else(|_| "positions".to_string());

    let store = PositionStore::connect(&mongo_url, &mongo_database, &mongo_collection)
        .await
        .context("Failed to create MongoDB client")?;

    store.test_connection().await.context("Failed to connect to MongoDB")?;

    println!("✅ Connected to document store: {}", store.namespace());

    // Connect to the warehouse
    let database_url = match &cli.database_url {
        Some(url) => url.clone(),
        None => env::var("DATABASE_URL").context("DATABASE_URL not found in environment. Please check your .env file")?,
    };

    println!("\n💾 Connecting to PostgreSQL warehouse...");
    let database = Database::new(&database_url, cli.workers as u32 + 1)
        .await
        .context("Failed to connect to PostgreSQL database")?;

    database.test_connection().await.context("Database connection test failed")?;

    println!("✅ Warehouse connected successfully!");

    // Apply the warehouse schema (dimensions, fact table, rollup objects)
    println!("📋 Running database migrations...");
    database.migrate().await.context("Failed to run database migrations")?;

    println!("✅ Warehouse schema ready!");

    tracing::info!("Flight Warehouse ETL initialized successfully");

    let config = pipeline::PipelineConfig {
        interval: Duration::from_secs(cli.interval),
        batch_size: cli.batch_size,
        workers: cli.workers,
        maintenance_every: cli.maintenance_every,
        retention_hours: cli.retention_hours,
        lookback_hours: cli.lookback_hours,
    };

    let pipeline = pipeline::Pipeline::new(store, database, config);

    // Runs until the process receives a termination signal
    pipeline.run().await.context("Pipeline execution failed")?;

    Ok(())
}

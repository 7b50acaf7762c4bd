//! # Partner Fetch Driver
//!
//! Purpose: Log in with settings from a `.env` file and stream every partner
//! through the batched parallel fetch pipeline, printing each record.
//!
//! Usage: `fetch_records [ENV_FILE] [BATCH_SIZE] [MAX_IDS]`
//! (defaults: `.env`, 100, 1000). Set `RUST_LOG` to change log verbosity.

use std::env;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use odoo_client::{fetch_records, CancelToken, ClientConfig, FetchOptions, OdooClient};
use odoo_common::{describe, Domain, ResPartner};

const DEFAULT_ENV_FILE: &str = ".env";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_IDS: usize = 1000;

struct DriverConfig {
    env_file: String,
    batch_size: usize,
    max_ids: usize,
}

impl DriverConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let env_file = args.next().unwrap_or_else(|| DEFAULT_ENV_FILE.to_string());
        let batch_size = parse_usize(args.next(), DEFAULT_BATCH_SIZE);
        let max_ids = parse_usize(args.next(), DEFAULT_MAX_IDS);
        DriverConfig {
            env_file,
            batch_size,
            max_ids,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let driver = DriverConfig::from_args();
    let config = ClientConfig::from_env_file(&driver.env_file)
        .with_context(|| format!("failed to read {}", driver.env_file))?;

    let client = OdooClient::connect(&config)
        .await
        .context("failed to connect")?;
    let client = Arc::new(client);

    let options = FetchOptions::default()
        .with_batch_size(driver.batch_size)
        .with_max_ids(driver.max_ids);

    let start = Instant::now();
    let mut stream = fetch_records::<ResPartner>(
        Arc::clone(&client),
        &Domain::all(),
        &options,
        CancelToken::new(),
    )
    .await
    .context("failed to start partner fetch")?;

    while let Some(partner) = stream.next().await {
        println!("{}", describe(&partner));
    }
    let summary = stream.finish().await;
    let metrics = client.metrics();

    println!(
        "partners: ids={}, batches={}, failed={}, records={}, mapping_failures={}, elapsed={:?}",
        summary.ids_total,
        summary.batches_total,
        summary.batches_failed,
        summary.records_sent,
        summary.mapping_failures,
        start.elapsed()
    );
    println!(
        "calls: total={}, faults={}, transport_errors={}",
        metrics.calls_total, metrics.faults_total, metrics.transport_errors_total
    );

    Ok(())
}

//! Follow every Rentwise topic and log each event as it arrives.
//!
//! Useful for watching the lifecycle from outside the server:
//!
//! ```text
//! REDPANDA_CONSUMER_GROUP=tail-$(whoami) cargo run --bin event-tail
//! ```

use anyhow::Context;
use futures::StreamExt;
use rentwise_core::Topic;
use rentwise_redpanda::RedpandaEventLog;
use rentwise_server::{Config, init_tracing};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("Failed to read .env");
        }
    }
    init_tracing();

    let config = Config::from_env();
    let log = RedpandaEventLog::builder()
        .brokers(&config.redpanda.brokers)
        .consumer_group(&config.redpanda.consumer_group)
        .timeout(config.redpanda_timeout())
        .build()
        .context("Failed to build Redpanda client")?;

    let mut events = log
        .subscribe(&Topic::ALL)
        .context("Failed to subscribe")?;
    info!(brokers = %config.redpanda.brokers, topics = ?Topic::ALL, "Tailing events");

    loop {
        tokio::select! {
            next = events.next() => match next {
                Some(Ok(event)) => info!(
                    topic = %event.topic().name(),
                    event_type = %event.event_type(),
                    key = %event.key(),
                    timestamp = %event.timestamp(),
                    data = %event.data(),
                    "Event"
                ),
                Some(Err(e)) => error!(error = %e, "Failed to decode event"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Stopped tailing");
    Ok(())
}

//! `rbi ingest`: add a message to a bridge by hand.
//!
//! Unlike the webhook, this path retries retryable embedding failures with
//! exponential backoff before giving up.

use anyhow::Result;

use crate::app::Services;
use crate::config::Config;
use crate::ingest::IngestOutcome;
use crate::retry::{with_backoff, Backoff};

pub async fn run_ingest(
    config: &Config,
    bridge_id: &str,
    text: &str,
    sender: &str,
    retries: u32,
) -> Result<()> {
    let services = Services::open(config).await?;
    let pipeline = &services.ingest;

    let outcome = with_backoff(Backoff::standard(retries), move || {
        pipeline.ingest_direct(bridge_id, sender, text)
    })
    .await?;

    match outcome {
        IngestOutcome::Stored { id } => println!("Stored message {}", id),
        IngestOutcome::Skipped => println!("Skipped: message text is empty"),
    }
    Ok(())
}

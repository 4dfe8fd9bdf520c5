//! Paginated history for `rbi history`.

use anyhow::{bail, Result};

use crate::app::Services;
use crate::config::Config;
use crate::stats::format_line;

pub async fn run_history(
    config: &Config,
    bridge_id: &str,
    page: i64,
    page_size: Option<i64>,
) -> Result<()> {
    let services = Services::open(config).await?;
    if services.store.get_bridge(bridge_id).await?.is_none() {
        bail!("No bridge with id: {}", bridge_id);
    }

    let page_size = page_size
        .unwrap_or(config.history.default_page_size)
        .min(config.history.max_page_size);
    let result = services.store.recent(bridge_id, page, page_size).await?;

    if result.messages.is_empty() {
        println!("No messages on page {} ({} total).", result.page, result.total);
        return Ok(());
    }

    for m in &result.messages {
        println!("{}", format_line(m));
    }
    println!();
    println!(
        "Page {} of {} ({} messages)",
        result.page,
        result.total_pages.max(1),
        result.total
    );
    Ok(())
}

//! Bridge statistics for `rbi stats`.
//!
//! Prints the same summary the dashboard shows: total messages, a
//! per-platform breakdown and the latest few messages.

use anyhow::{bail, Result};

use rainbow_intel_core::models::{BridgeStats, Message};

use crate::app::Services;
use crate::config::Config;

/// Run the stats command for one bridge and print a summary.
pub async fn run_stats(config: &Config, bridge_id: &str) -> Result<()> {
    let services = Services::open(config).await?;
    let Some(bridge) = services.store.get_bridge(bridge_id).await? else {
        bail!("No bridge with id: {}", bridge_id);
    };
    let stats = services.store.stats(bridge_id).await?;

    println!("Rainbow Intel — Bridge Stats");
    println!("============================");
    println!();
    println!("  Bridge:      {} ({})", bridge.name, bridge.id);
    println!(
        "  Intelligence: {}",
        if bridge.intelligence_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    print!("{}", render(&stats));
    Ok(())
}

fn render(stats: &BridgeStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("  Messages:    {}\n", stats.total_messages));

    if !stats.platform_breakdown.is_empty() {
        out.push_str("\n  By platform:\n");
        for (platform, count) in &stats.platform_breakdown {
            out.push_str(&format!("  {:<10} {:>8}\n", platform.as_str(), count));
        }
    }

    if !stats.recent_messages.is_empty() {
        out.push_str("\n  Recent:\n");
        for m in &stats.recent_messages {
            out.push_str(&format!("  {}\n", format_line(m)));
        }
    }
    out
}

/// One-line rendering shared with `rbi history`.
pub fn format_line(m: &Message) -> String {
    format!(
        "{}  [{}] {}: {}",
        m.created_at.format("%Y-%m-%d %H:%M"),
        m.platform,
        m.sender,
        truncate(&m.content, 80)
    )
}

fn truncate(s: &str, max: usize) -> String {
    let single_line = s.replace('\n', " ");
    match single_line.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &single_line[..idx]),
        None => single_line,
    }
}

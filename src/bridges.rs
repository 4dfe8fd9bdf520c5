//! Bridge registry commands (`rbi bridge …`).
//!
//! A bridge's bearer token is shown exactly once, when the bridge is
//! created; `rbi bridge list` never prints it.

use anyhow::{bail, Result};

use rainbow_intel_core::models::Bridge;

use crate::app::Services;
use crate::config::Config;

pub async fn run_create(config: &Config, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("bridge name must not be empty");
    }

    let services = Services::open(config).await?;
    let bridge = Bridge::generate(name);
    services.store.create_bridge(&bridge).await?;

    println!("Created bridge {}", bridge.name);
    println!("  id:       {}", bridge.id);
    println!("  gateway:  bridge-{}", bridge.id);
    println!("  token:    {}", bridge.api_token);
    println!();
    println!("Store the token now; it is not shown again.");
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;
    let bridges = services.store.list_bridges().await?;

    if bridges.is_empty() {
        println!("No bridges registered. Create one with `rbi bridge create <name>`.");
        return Ok(());
    }

    println!("{:<38} {:<24} {:<10} {:>8}", "ID", "NAME", "INTEL", "MESSAGES");
    for b in &bridges {
        let count = services.store.count(&b.id).await?;
        println!(
            "{:<38} {:<24} {:<10} {:>8}",
            b.id,
            b.name,
            if b.intelligence_enabled { "on" } else { "off" },
            count
        );
    }
    Ok(())
}

pub async fn run_set_intelligence(config: &Config, id: &str, enabled: bool) -> Result<()> {
    let services = Services::open(config).await?;
    if !services.store.set_intelligence(id, enabled).await? {
        bail!("No bridge with id: {}", id);
    }
    println!(
        "Intelligence {} for bridge {}",
        if enabled { "enabled" } else { "disabled" },
        id
    );
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let services = Services::open(config).await?;
    if !services.store.delete_bridge(id).await? {
        bail!("No bridge with id: {}", id);
    }
    println!("Deleted bridge {} and its message history", id);
    Ok(())
}

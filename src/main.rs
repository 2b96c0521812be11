// src/main.rs

//! # Resource Registry - Migration Runner
//!
//! Loads a genesis state into an in-memory store, repairs every family's
//! version chain and prints the repair report as JSON.
//!
//! ## Configuration
//! - `registry.toml` in the working directory (optional)
//! - `REGISTRY__GENESIS_PATH`: genesis JSON file (required unless set in the file)
//! - `REGISTRY__REPAIR_PAGE_SIZE`: scan page size (default: 100)
//! - `RUST_LOG`: log filter, e.g. `info`

use std::fs;

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use log::{error, info};

use resource_registry::genesis::GenesisState;
use resource_registry::services::chain_repair::{audit_family, repair_links, RepairOptions};
use resource_registry::storage::memory::MemoryStore;
use resource_registry::storage::FamilyKeys;
use resource_registry::Settings;

/// Main application entry point
///
/// # Run Sequence
/// 1. Load environment and settings
/// 2. Validate and import the genesis state
/// 3. Repair all version chains
/// 4. Audit every family and print the report
fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load().context("loading settings")?;
    let Some(genesis_path) = settings.genesis_path.as_deref() else {
        bail!("genesis_path is not set (REGISTRY__GENESIS_PATH or registry.toml)");
    };

    let json = fs::read_to_string(genesis_path)
        .with_context(|| format!("reading {genesis_path}"))?;
    let genesis = GenesisState::from_json(&json)
        .with_context(|| format!("parsing {genesis_path}"))?;

    let mut store = MemoryStore::new();
    genesis.import(&mut store).context("importing genesis state")?;

    let options = RepairOptions {
        page_size: settings.repair_page_size,
        resume_after: None,
    };
    let report = repair_links(&mut store, &options).context("repairing version chains")?;

    let mut audited = 0;
    let mut broken = 0;
    for family in FamilyKeys::new(&store, settings.repair_page_size) {
        let family = family.context("listing families")?;
        audited += 1;
        if let Err(e) = audit_family(&store, &family, settings.repair_page_size) {
            error!("audit failed: {}", e);
            broken += 1;
        }
    }
    info!("audited {} families, {} broken", audited, broken);

    println!("{}", serde_json::to_string_pretty(&report)?);

    if broken > 0 || !report.failures.is_empty() {
        bail!("{} families could not be repaired", broken.max(report.failures.len()));
    }
    Ok(())
}

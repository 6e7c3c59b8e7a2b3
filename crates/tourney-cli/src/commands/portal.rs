use serde::Serialize;
use tourney_core::sync::{PortalSyncStatus, SyncEngine};
use tourney_core::util::sanitize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct PortalReport {
    pub healthy: bool,
    pub error: Option<String>,
    pub counts: PortalSyncStatus,
}

pub async fn portal_report(engine: &SyncEngine) -> Result<PortalReport, CliError> {
    let portal = engine.portal();
    let (healthy, error) = match portal.health().await {
        Ok(()) => (true, None),
        Err(error) => (false, Some(sanitize(&error))),
    };
    let counts = portal.sync_status().await?;
    Ok(PortalReport {
        healthy,
        error,
        counts,
    })
}

pub async fn run_portal(engine: &SyncEngine, as_json: bool) -> Result<(), CliError> {
    let report = portal_report(engine).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match &report.error {
        None => println!("Portal: healthy"),
        Some(error) => println!("Portal: unhealthy ({error})"),
    }
    for (name, value) in &report.counts.0 {
        println!("  {name}: {value}");
    }
    Ok(())
}

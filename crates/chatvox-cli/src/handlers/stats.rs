//! `stats`: spend, permission and cache statistics.

use anyhow::Result;
use chatvox_core::{CacheStats, CostStats, PermissionStats};
use chatvox_engine::EngineStatus;
use serde::Serialize;

use crate::bootstrap::CliContext;
use crate::presentation::{
    print_cache_stats, print_cost_stats, print_engines, print_permission_stats,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    cost: CostStats,
    permissions: PermissionStats,
    cache: CacheStats,
    engines: Vec<EngineStatus>,
}

pub async fn execute(ctx: &CliContext, json: bool) -> Result<()> {
    let service = ctx.service();
    let report = StatsReport {
        cost: service.cost_stats().await,
        permissions: service.permission_stats().await?,
        cache: service.cache_stats().await,
        engines: service.engine_status(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Data directory: {}", ctx.data_dir.display());
        println!();
        print_cost_stats(&report.cost);
        println!();
        print_permission_stats(&report.permissions);
        print_cache_stats(&report.cache);
        if !report.engines.is_empty() {
            println!();
            print_engines(&report.engines);
        }
    }
    Ok(())
}

//! Thin administrative command dispatcher over a backend graph (§6):
//! `mount-pak`/`unmount-pak` on the graph's hierarchical node, and a
//! usage-stats dump. Stands in for "game-engine integration", which the
//! core itself has no opinion about.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ddc::Cache;
use ddc_backend::InFlightCounter;
use ddc_config::{BackendGraph, build};
use ddc_core::UsageStatsMap;
use tracing::{error, info};

fn usage() -> &'static str {
    "usage: ddc-cli <graph.json> <mount-pak <path> | unmount-pak <path> | stats>"
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [graph_path, command, rest @ ..] = args.as_slice() else {
        eprintln!("{}", usage());
        return ExitCode::FAILURE;
    };

    match run(graph_path, command, rest).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "ddc-cli: command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(graph_path: &str, command: &str, rest: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let description = tokio::fs::read_to_string(graph_path).await?;
    let graph = BackendGraph::from_json(&description)?;
    let built = build(graph, InFlightCounter::new()).await?;

    match command {
        "mount-pak" => {
            let [path] = rest else {
                return Err(usage().into());
            };
            let hier = built.hierarchical.ok_or("graph has no hierarchical node to mount onto")?;
            let pak = Arc::new(ddc_pak::ReadPak::open(PathBuf::from(path))?);
            hier.mount_tier(pak, path.clone()).await;
            info!(path, "mounted read-pak");
        }
        "unmount-pak" => {
            let [path] = rest else {
                return Err(usage().into());
            };
            let hier = built.hierarchical.ok_or("graph has no hierarchical node to unmount from")?;
            match hier.unmount_tier(path).await {
                Some(_) => info!(path, "unmounted read-pak"),
                None => return Err(format!("no tier mounted under {path}").into()),
            }
        }
        "stats" => {
            let root = built.root.ok_or("graph has no root backend")?;
            let cache = Cache::new(root, InFlightCounter::new());
            let map: UsageStatsMap = cache.gather_usage_stats();
            println!("{}", serde_json::to_string_pretty(&stats_as_json(&map))?);
        }
        _ => return Err(usage().into()),
    }

    Ok(())
}

/// `DdcUsageStatsSnapshot` doesn't derive `Serialize` (it lives in a
/// crate with no `serde` dependency); flatten it into plain JSON values
/// here instead of adding that dependency just for this one CLI report.
fn stats_as_json(map: &UsageStatsMap) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (path, snapshot) in map {
        out.insert(
            path.clone(),
            serde_json::json!({
                "get": { "game_thread": op(snapshot.get_game_thread), "other_threads": op(snapshot.get_other_threads) },
                "put": { "game_thread": op(snapshot.put_game_thread), "other_threads": op(snapshot.put_other_threads) },
                "exists": { "game_thread": op(snapshot.exists_game_thread), "other_threads": op(snapshot.exists_other_threads) },
            }),
        );
    }
    serde_json::Value::Object(out)
}

fn op(snapshot: ddc_core::OpStatsSnapshot) -> serde_json::Value {
    serde_json::json!({ "calls": snapshot.calls, "hits": snapshot.hits, "bytes": snapshot.bytes })
}

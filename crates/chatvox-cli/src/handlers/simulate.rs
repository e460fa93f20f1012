//! `simulate`: replay a scripted scenario.
//!
//! Alice (allowed, team level 2) sends four messages inside the rate-limit
//! window of three per minute. The first engine in the chain hangs past every
//! attempt timeout, so its circuit opens and the second engine serves the
//! rest. Only the serving engine is billed.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chatvox_core::{
    CostStats, PermissionChange, PlaybackSettings, ProcessorStats, SpeakTrigger,
    SynthesisProvider, TtsSettings,
};
use chatvox_engine::{EngineStatus, SinkKind, TtsServiceDeps, build_tts_service};
use chatvox_providers::{ScriptStep, ScriptedProvider};
use chatvox_store::StoreFactory;

use super::{spawn_event_printer, wait_idle};
use crate::presentation::{print_cost_stats, print_engines, print_processor_stats};

const MESSAGES: [&str; 4] = [
    "hello everyone",
    "this stream is great",
    "what game is next",
    "one more thing",
];

/// What the scenario produced.
#[derive(Debug)]
pub struct SimulationReport {
    /// Per message: accepted, or the rejection shown to the user.
    pub outcomes: Vec<Result<u32, String>>,
    pub stats: ProcessorStats,
    pub cost: CostStats,
    pub engines: Vec<EngineStatus>,
    pub calls: BTreeMap<String, usize>,
}

fn scenario_settings() -> TtsSettings {
    TtsSettings {
        rate_limit: 3,
        rate_limit_window_secs: 60,
        engine_order: vec!["speechify".into(), "google".into(), "tiktok".into()],
        attempt_timeout_ms: 500,
        playback: PlaybackSettings {
            chars_per_second: 40.0,
            grace_ms: 200,
        },
        diagnostics: true,
        ..TtsSettings::default()
    }
}

/// Run the scenario against in-memory stores and scripted engines.
pub async fn run_scenario(json: bool) -> Result<SimulationReport> {
    let speechify = Arc::new(ScriptedProvider::new("speechify", 0.0005).then(ScriptStep::Hang));
    let google = Arc::new(ScriptedProvider::new("google", 0.000_016));
    let tiktok = Arc::new(ScriptedProvider::new("tiktok", 0.0));
    let providers: Vec<Arc<dyn SynthesisProvider>> = vec![
        Arc::clone(&speechify) as Arc<dyn SynthesisProvider>,
        Arc::clone(&google) as Arc<dyn SynthesisProvider>,
        Arc::clone(&tiktok) as Arc<dyn SynthesisProvider>,
    ];

    let stores = StoreFactory::in_memory();
    let service = build_tts_service(TtsServiceDeps {
        settings: scenario_settings(),
        providers,
        permissions: stores.permissions,
        ledger: stores.ledger,
        cache: stores.cache,
        sink: SinkKind::Timed,
    })
    .await?;
    let printer = spawn_event_printer(service.subscribe()?, json);

    service
        .set_user("alice", "alice", &PermissionChange::Allow)
        .await?;
    service
        .set_user("alice", "alice", &PermissionChange::SetTeamLevel { level: 2 })
        .await?;

    let mut outcomes = Vec::with_capacity(MESSAGES.len());
    for text in MESSAGES {
        let outcome = service
            .speak(SpeakTrigger::chat("alice", "alice", text))
            .await
            .map(|receipt| receipt.position)
            .map_err(|e| e.user_message());
        outcomes.push(outcome);
    }
    wait_idle(&service).await?;

    let report = SimulationReport {
        outcomes,
        stats: service.status().await?.stats,
        cost: service.cost_stats().await,
        engines: service.engine_status(),
        calls: [&speechify, &google, &tiktok]
            .into_iter()
            .map(|provider| (provider.id().to_string(), provider.calls()))
            .collect(),
    };
    service.shutdown().await;
    let _ = printer.await;
    Ok(report)
}

pub async fn execute(json: bool) -> Result<()> {
    let report = run_scenario(json).await?;
    if json {
        return Ok(());
    }

    println!();
    for (text, outcome) in MESSAGES.iter().zip(&report.outcomes) {
        match outcome {
            Ok(position) => println!("alice: {text:<24} queued at #{position}"),
            Err(reason) => println!("alice: {text:<24} rejected ({reason})"),
        }
    }
    println!();
    print_processor_stats(&report.stats);
    println!();
    print_engines(&report.engines);
    println!();
    for (engine, calls) in &report.calls {
        println!("{engine}: {calls} call(s)");
    }
    println!();
    print_cost_stats(&report.cost);
    Ok(())
}

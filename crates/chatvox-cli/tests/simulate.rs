//! The bundled scenario, run on a paused clock.

use chatvox_cli::handlers::simulate::run_scenario;
use chatvox_engine::CircuitState;

#[tokio::test(start_paused = true)]
async fn scenario_rate_limits_and_trips_the_hanging_engine() {
    let report = run_scenario(true).await.unwrap();

    assert!(report.outcomes[..3].iter().all(Result::is_ok));
    assert!(report.outcomes[3].is_err());

    assert_eq!(report.stats.received, 4);
    assert_eq!(report.stats.rate_limited, 1);
    assert_eq!(report.stats.completed, 3);

    assert_eq!(report.calls["speechify"], 3);
    assert_eq!(report.calls["google"], 3);
    assert_eq!(report.calls["tiktok"], 0);

    let speechify = report
        .engines
        .iter()
        .find(|engine| engine.id.as_str() == "speechify")
        .unwrap();
    assert_eq!(speechify.circuit, CircuitState::Open);

    let billed: Vec<_> = report.cost.engines.keys().map(|id| id.as_str()).collect();
    assert_eq!(billed, ["google"]);
}

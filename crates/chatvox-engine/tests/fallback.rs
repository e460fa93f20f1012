//! Fallback chain, circuit breaking and cost attribution through the service.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chatvox_core::{
    EngineId, PermissionChange, ProviderError, RequestStatus, SpeakTrigger, SynthesisProvider,
    SynthesisRequest, SynthesizedAudio, TtsError, VoiceInfo,
};
use chatvox_engine::{CircuitState, SinkKind};
use chatvox_providers::{ScriptStep, ScriptedProvider};
use mockall::mock;

use common::{finished, service, settings};

mock! {
    pub Provider {}

    #[async_trait]
    impl SynthesisProvider for Provider {
        fn id(&self) -> EngineId;
        fn cost_per_char(&self) -> f64;
        fn voices(&self) -> Vec<VoiceInfo>;
        async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError>;
    }
}

/// Provider that panics mid-synthesis.
struct Crashing;

#[async_trait]
impl SynthesisProvider for Crashing {
    fn id(&self) -> EngineId {
        EngineId::new("crash")
    }

    fn cost_per_char(&self) -> f64 {
        0.0
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<SynthesizedAudio, ProviderError> {
        panic!("provider crashed");
    }
}

fn mock_provider(id: &str, cost_per_char: f64) -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_id().return_const(EngineId::new(id));
    provider.expect_cost_per_char().return_const(cost_per_char);
    provider.expect_voices().returning(Vec::new);
    provider
}

#[tokio::test(start_paused = true)]
async fn only_the_serving_engine_is_billed() {
    let mut a = mock_provider("a", 0.01);
    a.expect_synthesize()
        .times(1)
        .returning(|_| Err(ProviderError::server(Some(500), "boom")));
    let mut b = mock_provider("b", 0.02);
    b.expect_synthesize()
        .times(1)
        .returning(|_| Err(ProviderError::auth("expired key")));
    let mut c = mock_provider("c", 0.001);
    c.expect_synthesize()
        .times(1)
        .returning(|_| Ok(SynthesizedAudio::new(b"ID3".to_vec(), "audio/mpeg")));

    let providers: Vec<Arc<dyn SynthesisProvider>> = vec![Arc::new(a), Arc::new(b), Arc::new(c)];
    let tts = service(settings(&["a", "b", "c"]), providers, SinkKind::Timed).await;
    let mut sub = tts.subscribe().unwrap();

    tts.speak(SpeakTrigger::admin("ten chars!")).await.unwrap();
    let done = finished(&mut sub, 1).await;
    assert_eq!(done[0].1, RequestStatus::Completed);

    let cost = tts.cost_stats().await;
    assert_eq!(cost.engines.len(), 1);
    let spend = cost.engines[&EngineId::new("c")];
    assert_eq!(spend.characters, 10);
    assert_eq!(spend.requests, 1);
    assert!((spend.cost - 0.01).abs() < 1e-9);
    tts.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failing_engine_trips_and_is_bypassed() {
    // Rate limit 3 per 60 s; the first engine hangs past every attempt timeout.
    let speechify = Arc::new(ScriptedProvider::new("speechify", 0.0005).then(ScriptStep::Hang));
    let google = Arc::new(ScriptedProvider::new("google", 0.000_016));
    let tiktok = Arc::new(ScriptedProvider::new("tiktok", 0.0));
    let providers: Vec<Arc<dyn SynthesisProvider>> = vec![
        Arc::clone(&speechify) as Arc<dyn SynthesisProvider>,
        Arc::clone(&google) as Arc<dyn SynthesisProvider>,
        Arc::clone(&tiktok) as Arc<dyn SynthesisProvider>,
    ];
    let tts = service(
        settings(&["speechify", "google", "tiktok"]),
        providers,
        SinkKind::Timed,
    )
    .await;
    tts.set_user("alice-id", "alice", &PermissionChange::Allow)
        .await
        .unwrap();
    tts.set_user("alice-id", "alice", &PermissionChange::SetTeamLevel { level: 2 })
        .await
        .unwrap();
    let mut sub = tts.subscribe().unwrap();

    let messages = ["first message", "second message", "third message", "fourth message"];
    let mut outcomes = Vec::new();
    for text in messages {
        outcomes.push(tts.speak(SpeakTrigger::chat("alice-id", "alice", text)).await);
    }
    assert!(outcomes[..3].iter().all(Result::is_ok));
    assert!(matches!(outcomes[3], Err(TtsError::RateLimited { .. })));

    let done = finished(&mut sub, 4).await;
    assert_eq!(
        done.iter().filter(|(_, s)| *s == RequestStatus::RateLimited).count(),
        1
    );
    assert_eq!(
        done.iter().filter(|(_, s)| *s == RequestStatus::Completed).count(),
        3
    );

    assert_eq!(speechify.calls(), 3);
    assert_eq!(google.calls(), 3);
    assert_eq!(tiktok.calls(), 0);

    let status = tts.engine_status();
    let speechify_status = status
        .iter()
        .find(|s| s.id == EngineId::new("speechify"))
        .unwrap();
    assert_eq!(speechify_status.circuit, CircuitState::Open);

    // With the circuit open, the next request goes straight to google.
    tts.speak(SpeakTrigger::admin("operator says hi")).await.unwrap();
    finished(&mut sub, 1).await;
    assert_eq!(speechify.calls(), 3);
    assert_eq!(google.calls(), 4);

    let cost = tts.cost_stats().await;
    assert!(!cost.engines.contains_key(&EngineId::new("speechify")));
    assert_eq!(cost.engines[&EngineId::new("google")].requests, 4);

    let stats = tts.status().await.unwrap().stats;
    assert_eq!(stats.received, 5);
    assert_eq!(stats.rate_limited, 1);
    assert_eq!(stats.completed, 4);
    tts.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_chain_fails_the_request() {
    let broken = Arc::new(ScriptedProvider::new("broken", 0.0).then(ScriptStep::Fail {
        error: ProviderError::transport("connection refused"),
    }));
    let tts = service(settings(&["broken"]), vec![broken], SinkKind::Timed).await;
    let mut sub = tts.subscribe().unwrap();

    tts.speak(SpeakTrigger::admin("nobody will hear this"))
        .await
        .unwrap();
    let done = finished(&mut sub, 1).await;
    assert_eq!(done[0].1, RequestStatus::Failed);
    assert_eq!(tts.status().await.unwrap().stats.failed, 1);
    assert!(tts.cost_stats().await.engines.is_empty());
    tts.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn open_circuit_recovers_after_cooldown() {
    let flaky = Arc::new(
        ScriptedProvider::new("flaky", 0.0)
            .with_script(std::iter::repeat_n(
                ScriptStep::Fail {
                    error: ProviderError::server(Some(502), "bad gateway"),
                },
                3,
            ))
            .then(ScriptStep::default()),
    );
    let backup = Arc::new(ScriptedProvider::new("backup", 0.0));
    let providers: Vec<Arc<dyn SynthesisProvider>> = vec![
        Arc::clone(&flaky) as Arc<dyn SynthesisProvider>,
        Arc::clone(&backup) as Arc<dyn SynthesisProvider>,
    ];
    let tts = service(settings(&["flaky", "backup"]), providers, SinkKind::Timed).await;
    let mut sub = tts.subscribe().unwrap();
    let circuit = |tts: &chatvox_engine::TtsService| {
        tts.engine_status()
            .into_iter()
            .find(|s| s.id == EngineId::new("flaky"))
            .map(|s| s.circuit)
    };

    for i in 0..3 {
        tts.speak(SpeakTrigger::admin(format!("warmup {i}")))
            .await
            .unwrap();
        finished(&mut sub, 1).await;
    }
    assert_eq!(circuit(&tts), Some(CircuitState::Open));

    tts.speak(SpeakTrigger::admin("while open")).await.unwrap();
    finished(&mut sub, 1).await;
    assert_eq!(flaky.calls(), 3);

    // Cooldown defaults to 60 s; the next request is the half-open probe.
    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    tts.speak(SpeakTrigger::admin("probe")).await.unwrap();
    finished(&mut sub, 1).await;
    assert_eq!(flaky.calls(), 4);
    assert_eq!(circuit(&tts), Some(CircuitState::Closed));
    assert_eq!(backup.calls(), 4);
    tts.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn crashed_synthesis_fails_the_request_and_frees_the_output() {
    let tts = service(
        settings(&["crash"]),
        vec![Arc::new(Crashing) as Arc<dyn SynthesisProvider>],
        SinkKind::Timed,
    )
    .await;
    let mut sub = tts.subscribe().unwrap();

    let first = tts.speak(SpeakTrigger::admin("boom")).await.unwrap();
    let second = tts.speak(SpeakTrigger::admin("boom again")).await.unwrap();
    assert_eq!(
        finished(&mut sub, 2).await,
        vec![
            (first.id, RequestStatus::Failed),
            (second.id, RequestStatus::Failed)
        ]
    );

    let status = tts.status().await.unwrap();
    assert!(status.current.is_none());
    assert_eq!(status.stats.failed, 2);
    tts.shutdown().await;
}

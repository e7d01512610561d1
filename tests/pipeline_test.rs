//! Pipeline adapter tests: lifecycle events against a local worker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use common::{spawn_worker, tts_script, CountingProvisioner, TOKEN};
use voice_relay::registry::EndpointRegistry;
use voice_relay::tunnel::{StaticProvisioner, TunnelConfig};
use voice_relay::{
    run_control_loop, AdapterConfig, ControlKind, Credential, PipelineAdapter, PipelineError,
    PipelineEvent, ProtocolFlavor, SessionError, StreamMessage, TunnelError, TunnelManager,
    WorkerDescriptor,
};

const WAIT: Duration = Duration::from_secs(5);

fn tts_worker() -> WorkerDescriptor {
    WorkerDescriptor::new("swahili-csm-tts", "SwahiliTTS")
}

fn adapter_config() -> AdapterConfig {
    let mut config = AdapterConfig::new(ProtocolFlavor::Synthesis);
    config.session.credential = Some(Credential::new(TOKEN));
    config.session.end_markers = true;
    config.resolve_timeout = Duration::from_secs(2);
    config.initial_backoff = Duration::from_millis(10);
    config.max_backoff = Duration::from_millis(40);
    config
}

fn static_tunnels(url: &str) -> Arc<TunnelManager> {
    let provisioner = StaticProvisioner::new().with_worker(tts_worker(), url);
    Arc::new(TunnelManager::new(
        Arc::new(EndpointRegistry::new()),
        Arc::new(provisioner),
        TunnelConfig::default(),
    ))
}

async fn next(adapter: &mut PipelineAdapter) -> Option<StreamMessage> {
    tokio::time::timeout(WAIT, adapter.next_output())
        .await
        .expect("timed out waiting for output")
}

fn is_stream_end(message: &StreamMessage) -> bool {
    matches!(
        message,
        StreamMessage::ControlSignal {
            kind: ControlKind::StreamEnd
        }
    )
}

#[tokio::test]
async fn test_start_send_stop_releases_tunnel() {
    let worker = spawn_worker(tts_script(2, Duration::ZERO)).await;
    let tunnels = static_tunnels(&worker.url);
    let mut adapter = PipelineAdapter::new(tunnels.clone(), tts_worker(), adapter_config());

    adapter.start().await.unwrap();
    assert!(adapter.is_connected());
    assert_eq!(tunnels.open_count(), 1);

    // Starting again is a no-op.
    adapter.start().await.unwrap();
    assert_eq!(tunnels.open_count(), 1);
    assert_eq!(worker.connection_count(), 1);

    adapter
        .send(StreamMessage::prompt("Habari", 22, 250))
        .unwrap();
    let mut audio = 0;
    while let Some(message) = next(&mut adapter).await {
        if is_stream_end(&message) {
            break;
        }
        assert!(matches!(message, StreamMessage::AudioChunk { .. }));
        audio += 1;
    }
    assert_eq!(audio, 2);

    adapter.stop().await;
    assert!(!adapter.is_connected());
    assert_eq!(tunnels.open_count(), 0);
    assert!(adapter.next_output().await.is_none());
}

#[tokio::test]
async fn test_send_before_start_fails() {
    let tunnels = static_tunnels("ws://127.0.0.1:9/ws");
    let adapter = PipelineAdapter::new(tunnels, tts_worker(), adapter_config());
    let result = adapter.send(StreamMessage::prompt("Habari", 22, 250));
    assert!(matches!(result, Err(PipelineError::NotStarted)));
    assert!(adapter.user_interrupt().is_none());
}

#[tokio::test]
async fn test_user_interrupt_keeps_connection() {
    let worker = spawn_worker(tts_script(4, Duration::from_millis(30))).await;
    let tunnels = static_tunnels(&worker.url);
    let mut adapter = PipelineAdapter::new(tunnels, tts_worker(), adapter_config());
    adapter.start().await.unwrap();

    adapter.send(StreamMessage::prompt("one", 22, 250)).unwrap();
    assert!(next(&mut adapter).await.is_some());
    assert!(adapter.user_interrupt().is_some());
    assert!(adapter.is_connected());

    adapter.send(StreamMessage::prompt("two", 22, 250)).unwrap();
    let mut markers = Vec::new();
    while let Some(message) = next(&mut adapter).await {
        match message {
            StreamMessage::AudioChunk { bytes, .. } => markers.push(bytes[0]),
            other if is_stream_end(&other) => break,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(markers, vec![b't'; 4]);
    assert_eq!(worker.connection_count(), 1);

    adapter.stop().await;
}

#[tokio::test]
async fn test_cancel_discards_buffered_output() {
    let worker = spawn_worker(tts_script(10, Duration::ZERO)).await;
    let tunnels = static_tunnels(&worker.url);
    let mut adapter = PipelineAdapter::new(tunnels.clone(), tts_worker(), adapter_config());
    adapter.start().await.unwrap();

    adapter.send(StreamMessage::prompt("Habari", 22, 250)).unwrap();
    worker.wait_for_requests(1).await;
    adapter.cancel().await;

    assert!(!adapter.is_connected());
    assert!(adapter.next_output().await.is_none());
    assert_eq!(tunnels.open_count(), 0);

    // A cancelled adapter stays cancelled.
    assert!(matches!(adapter.start().await, Err(PipelineError::Cancelled)));
    assert_eq!(tunnels.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_resolve_releases_tunnel() {
    let provisioner = Arc::new(CountingProvisioner::default());
    let tunnels = Arc::new(TunnelManager::new(
        Arc::new(EndpointRegistry::new()),
        provisioner.clone(),
        TunnelConfig::default(),
    ));
    let mut config = adapter_config();
    config.resolve_timeout = Duration::from_secs(60);
    let mut adapter = PipelineAdapter::new(tunnels.clone(), tts_worker(), config);

    let token = adapter.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = adapter.start().await;
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(provisioner.released(), 1);
    assert_eq!(tunnels.open_count(), 0);

    adapter.cancel().await;
    assert_eq!(provisioner.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resolution_timeout_surfaces_and_releases() {
    let provisioner = Arc::new(CountingProvisioner::default());
    let tunnels = Arc::new(TunnelManager::new(
        Arc::new(EndpointRegistry::new()),
        provisioner.clone(),
        TunnelConfig::default(),
    ));
    let mut adapter = PipelineAdapter::new(tunnels, tts_worker(), adapter_config());

    let result = adapter.start().await;
    assert!(matches!(
        result,
        Err(PipelineError::Tunnel(TunnelError::ResolutionTimeout { .. }))
    ));
    assert_eq!(provisioner.released(), 1);
}

#[tokio::test]
async fn test_connect_retries_then_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let tunnels = static_tunnels(&format!("ws://127.0.0.1:{}/ws", port));
    let mut adapter = PipelineAdapter::new(tunnels.clone(), tts_worker(), adapter_config());

    let result = adapter.start().await;
    assert!(matches!(
        result,
        Err(PipelineError::Session(SessionError::Connection { .. }))
    ));
    assert!(!adapter.is_connected());
    assert_eq!(tunnels.open_count(), 0);
}

#[tokio::test]
async fn test_control_loop_drives_lifecycle() {
    let worker = spawn_worker(tts_script(3, Duration::ZERO)).await;
    let tunnels = static_tunnels(&worker.url);
    let adapter = PipelineAdapter::new(tunnels.clone(), tts_worker(), adapter_config());

    let (events_tx, events_rx) = mpsc::channel(16);
    let (outputs_tx, mut outputs_rx) = mpsc::channel(16);
    let task = tokio::spawn(run_control_loop(adapter, events_rx, outputs_tx));

    events_tx.send(PipelineEvent::Start).await.unwrap();
    events_tx
        .send(PipelineEvent::Send(StreamMessage::prompt("Habari", 22, 250)))
        .await
        .unwrap();

    let mut audio = 0;
    loop {
        let message = tokio::time::timeout(WAIT, outputs_rx.recv())
            .await
            .unwrap()
            .unwrap();
        if is_stream_end(&message) {
            break;
        }
        assert!(matches!(message, StreamMessage::AudioChunk { .. }));
        audio += 1;
    }
    assert_eq!(audio, 3);

    events_tx.send(PipelineEvent::Stop).await.unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(tunnels.open_count(), 0);
    assert!(outputs_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_control_loop_reports_start_failure() {
    let provisioner = Arc::new(CountingProvisioner {
        fail_provision: true,
        ..Default::default()
    });
    let tunnels = Arc::new(TunnelManager::new(
        Arc::new(EndpointRegistry::new()),
        provisioner,
        TunnelConfig::default(),
    ));
    let adapter = PipelineAdapter::new(tunnels, tts_worker(), adapter_config());

    let (events_tx, events_rx) = mpsc::channel(16);
    let (outputs_tx, mut outputs_rx) = mpsc::channel(16);
    let task = tokio::spawn(run_control_loop(adapter, events_rx, outputs_tx));

    events_tx.send(PipelineEvent::Start).await.unwrap();
    let message = tokio::time::timeout(WAIT, outputs_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(message.is_fatal());

    events_tx.send(PipelineEvent::Cancel).await.unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

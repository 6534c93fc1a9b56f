use super::*;
use tokio::net::TcpListener;

fn verify(endpoint: &str, force: bool) -> VerifyRequest {
    VerifyRequest {
        endpoint: endpoint.into(),
        cert_bundle: None,
        force,
    }
}

/// Endpoint of a local listener that accepts and drops connections
async fn open_port() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    (endpoint, listener)
}

/// Endpoint on which nothing listens
async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    drop(listener);
    endpoint
}

#[tokio::test]
async fn test_status_starts_unverified() {
    let dispatcher = create_test_dispatcher(RecordingTransport::new());

    let status = dispatcher.agent_status();
    assert_eq!(status.status, "online");
    assert!(!status.job_active);
    assert!(!status.config_verified);
    assert_eq!(status.agent_endpoint, "127.0.0.1:5006");
}

#[tokio::test]
async fn test_forced_verification_skips_network() {
    let transport = RecordingTransport::new();
    let dispatcher = create_test_dispatcher(transport.clone());
    let mut events = dispatcher.subscribe();

    let outcome = dispatcher
        .verify_endpoint(verify("10.20.30.40:5006", true))
        .await
        .unwrap();
    assert!(outcome.forced);
    assert_eq!(outcome.endpoint, "10.20.30.40:5006");
    assert_eq!(transport.call_count(), 0);

    let status = dispatcher.agent_status();
    assert!(status.config_verified);
    assert_eq!(status.agent_endpoint, "10.20.30.40:5006");

    match events.try_recv().unwrap() {
        Event::EndpointVerified { endpoint, forced } => {
            assert_eq!(endpoint, "10.20.30.40:5006");
            assert!(forced);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_forced_verification_still_checks_format() {
    let dispatcher = create_test_dispatcher(RecordingTransport::new());

    let result = dispatcher.verify_endpoint(verify("badformat", true)).await;
    assert!(matches!(
        result,
        Err(Error::Transport(TransportError::InvalidEndpoint { .. }))
    ));
    assert_eq!(dispatcher.agent_endpoint(), "127.0.0.1:5006");
}

#[tokio::test]
async fn test_verification_fails_at_format_stage() {
    let dispatcher = create_test_dispatcher(RecordingTransport::new());

    match dispatcher.verify_endpoint(verify("badformat", false)).await {
        Err(Error::Verification { stage, .. }) => assert_eq!(stage, ProbeStage::Format),
        other => panic!("expected Format failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_verification_fails_at_tcp_stage_and_clears_flag() {
    let transport = RecordingTransport::new();
    let dispatcher = create_test_dispatcher(transport.clone());
    dispatcher
        .verify_endpoint(verify("10.20.30.40:5006", true))
        .await
        .unwrap();
    let mut events = dispatcher.subscribe();

    let endpoint = closed_port().await;
    match dispatcher.verify_endpoint(verify(&endpoint, false)).await {
        Err(Error::Verification { stage, message }) => {
            assert_eq!(stage, ProbeStage::Tcp);
            assert!(!message.is_empty());
        }
        other => panic!("expected TCP failure, got {other:?}"),
    }

    assert_eq!(transport.call_count(), 0, "protocol stage never runs");
    let status = dispatcher.agent_status();
    assert!(!status.config_verified);
    // A failed verification does not replace the stored endpoint
    assert_eq!(status.agent_endpoint, "10.20.30.40:5006");
    assert!(matches!(
        events.try_recv().unwrap(),
        Event::VerificationFailed {
            stage: ProbeStage::Tcp,
            ..
        }
    ));
}

#[tokio::test]
async fn test_verification_success_stores_endpoint() {
    let transport = RecordingTransport::new();
    let dispatcher = create_test_dispatcher(transport.clone());
    let (endpoint, _listener) = open_port().await;

    let outcome = dispatcher
        .verify_endpoint(verify(&endpoint, false))
        .await
        .unwrap();
    assert!(!outcome.forced);

    assert_eq!(transport.messages(), vec![UidMessage::VersionProbe]);
    let status = dispatcher.agent_status();
    assert!(status.config_verified);
    assert_eq!(status.agent_endpoint, endpoint);
}

#[tokio::test]
async fn test_verification_fails_at_protocol_stage() {
    let transport = RecordingTransport::failing_on(
        0,
        TransportError::TlsError {
            endpoint: "127.0.0.1".into(),
            reason: "handshake failure".into(),
        },
    );
    let dispatcher = create_test_dispatcher(transport);
    let (endpoint, _listener) = open_port().await;

    match dispatcher.verify_endpoint(verify(&endpoint, false)).await {
        Err(Error::Verification { stage, message }) => {
            assert_eq!(stage, ProbeStage::MtlsApi);
            assert!(message.contains("handshake failure"));
        }
        other => panic!("expected mTLS/API failure, got {other:?}"),
    }
    assert!(!dispatcher.agent_status().config_verified);
}

#[tokio::test]
async fn test_cert_status_defaults_to_configured_bundle() {
    let dispatcher = create_test_dispatcher(RecordingTransport::new());

    let status = dispatcher.cert_status(None).await;
    assert_eq!(status.bundle, "default");
    assert!(status.ready);

    let status = dispatcher.cert_status(Some("site-b")).await;
    assert_eq!(status.bundle, "site-b");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_reports_active_job() {
    let transport = GatedTransport::new();
    let dispatcher = create_test_dispatcher(transport.clone());

    dispatcher
        .start_range_job(range_spec("10.0.0.0/30", 2))
        .await
        .unwrap();
    transport.in_flight.notified().await;
    assert!(dispatcher.agent_status().job_active);

    transport.release(1);
    wait_for_idle(&dispatcher).await;
    assert!(!dispatcher.agent_status().job_active);
}

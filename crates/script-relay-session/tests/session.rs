use std::sync::Arc;
use std::time::Duration;

use script_relay_core::{
    ConnectionState, InputPolicy, SessionUpdate, StatusKind, Stream, TransportSignal,
};
use script_relay_session::{
    FrameDisposition, JobDescriptor, RouteOutcome, SessionConfig, SessionError, SessionEvent,
    SessionManager, submit::RecordingSubmitter,
};
use script_relay_transport::{LoopbackConnector, RemoteEnd};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};

const BASE_URL: &str = "wss://relay.example.com/prod";

struct Harness {
    manager: SessionManager,
    connector: Arc<LoopbackConnector>,
    submitter: Arc<RecordingSubmitter>,
    remotes: UnboundedReceiver<RemoteEnd>,
}

impl Harness {
    fn new(config: SessionConfig) -> Self {
        Self::with_submitter(config, RecordingSubmitter::new())
    }

    fn with_submitter(config: SessionConfig, submitter: RecordingSubmitter) -> Self {
        let (connector, remotes) = LoopbackConnector::new();
        let connector = Arc::new(connector);
        let submitter = Arc::new(submitter);
        let manager = SessionManager::new(config, connector.clone(), submitter.clone());
        Self {
            manager,
            connector,
            submitter,
            remotes,
        }
    }

    /// Connect to `execution_id` and handle the handshake.
    async fn open(&mut self, execution_id: &str) -> RemoteEnd {
        assert_ok!(self.manager.connect(execution_id).await);
        let remote = self.remotes.recv().await.unwrap();
        assert_eq!(self.manager.recv().await, Some(SessionEvent::Opened));
        remote
    }

    async fn deliver(&mut self, remote: &RemoteEnd, frame: &str) -> FrameDisposition {
        remote.send_frame(frame).unwrap();
        match self.manager.recv().await {
            Some(SessionEvent::Frame(disposition)) => disposition,
            other => panic!("expected a frame, got {other:?}"),
        }
    }
}

fn stdout_frame(execution_id: &str, line: &str) -> String {
    json!({
        "type": "output",
        "event": "stdout",
        "execution_id": execution_id,
        "data": { "line": line }
    })
    .to_string()
}

fn prompt_frame(execution_id: &str, prompt: &str) -> String {
    json!({
        "type": "status",
        "event": "input_required",
        "execution_id": execution_id,
        "data": { "prompt": prompt }
    })
    .to_string()
}

fn config() -> SessionConfig {
    SessionConfig::new(BASE_URL)
}

#[tokio::test]
async fn test_output_for_active_execution() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    let disposition = h.deliver(&remote, &stdout_frame("X", "hello")).await;
    assert_eq!(
        disposition,
        FrameDisposition::Routed(RouteOutcome::Output(Stream::Stdout))
    );
    assert_eq!(h.manager.output().stdout(), ["hello"]);
    assert_eq!(h.manager.history().len(), 1);
}

#[tokio::test]
async fn test_foreign_execution_only_grows_history() {
    let mut h = Harness::new(config());
    let remote = h.open("Y").await;

    let disposition = h.deliver(&remote, &stdout_frame("X", "hello")).await;
    assert_eq!(
        disposition,
        FrameDisposition::Routed(RouteOutcome::ExecutionMismatch)
    );
    let disposition = h.deliver(&remote, &prompt_frame("X", "Name?")).await;
    assert_eq!(
        disposition,
        FrameDisposition::Routed(RouteOutcome::ExecutionMismatch)
    );

    assert!(h.manager.output().is_empty());
    assert_eq!(h.manager.input_prompt(), None);
    assert_eq!(h.manager.history().len(), 2);
}

#[tokio::test]
async fn test_malformed_frames_are_recorded_not_routed() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    let disposition = h.deliver(&remote, "{not json").await;
    assert!(matches!(disposition, FrameDisposition::Undecodable(_)));
    let disposition = h.deliver(&remote, "[1, 2, 3]").await;
    assert!(matches!(disposition, FrameDisposition::Undecodable(_)));
    assert_eq!(h.deliver(&remote, "").await, FrameDisposition::Empty);

    let entries = h.manager.history().entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].raw_data, "{not json");
    assert!(entries[0].parsed.is_none());
    assert_eq!(entries[1].parsed, Some(json!([1, 2, 3])));
    assert!(entries[2].parsed.is_none());
    assert!(h.manager.output().is_empty());
    assert!(h.manager.is_connected());
}

#[tokio::test]
async fn test_output_with_loosely_typed_fields_is_routed() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    let frame = json!({
        "type": "output",
        "event": "stdout",
        "execution_id": "X",
        "data": { "line": "hi" },
        "timestamp": 1_700_000_000.5,
        "action": 7
    })
    .to_string();
    let disposition = h.deliver(&remote, &frame).await;

    assert_eq!(
        disposition,
        FrameDisposition::Routed(RouteOutcome::Output(Stream::Stdout))
    );
    assert_eq!(h.manager.output().stdout(), ["hi"]);
    let parsed = h.manager.history().entries()[0].parsed.as_ref().unwrap();
    assert_eq!(parsed["timestamp"], 1_700_000_000.5);
}

#[tokio::test]
async fn test_relayed_frame_routes_like_direct_frame() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    let wrapped = json!({
        "originalMessage": {
            "type": "output",
            "event": "stderr",
            "execution_id": "X",
            "data": { "line": "warning: low disk" }
        },
        "connectionId": "abc"
    })
    .to_string();
    h.deliver(&remote, &wrapped).await;

    assert_eq!(h.manager.output().stderr(), ["warning: low disk"]);
    let parsed = h.manager.history().entries()[0].parsed.as_ref().unwrap();
    assert_eq!(parsed["connectionId"], "abc");
}

#[tokio::test]
async fn test_prompt_lifecycle() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    h.deliver(&remote, &prompt_frame("X", "First?")).await;
    h.deliver(&remote, &prompt_frame("X", "Second?")).await;
    assert_eq!(h.manager.input_prompt(), Some("Second?"));

    let received = json!({
        "type": "status",
        "event": "input_received",
        "execution_id": "X",
        "data": {}
    })
    .to_string();
    let disposition = h.deliver(&remote, &received).await;
    assert_eq!(
        disposition,
        FrameDisposition::Routed(RouteOutcome::PromptCleared)
    );
    assert_eq!(h.manager.input_prompt(), None);
}

#[tokio::test]
async fn test_other_status_event_sets_status() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    let frame = json!({
        "type": "status",
        "event": "completed",
        "execution_id": "X",
        "data": { "exit_code": 0 }
    })
    .to_string();
    h.deliver(&remote, &frame).await;

    assert_eq!(h.manager.status().kind, StatusKind::Info);
    assert_eq!(h.manager.status().message, r#"completed: {"exit_code":0}"#);
}

#[tokio::test]
async fn test_submit_input_answers_prompt() {
    let mut h = Harness::new(config());
    let mut remote = h.open("X").await;
    h.deliver(&remote, &prompt_frame("X", "Enter number:")).await;

    let envelope = assert_ok!(h.manager.submit_input("42"));
    assert_eq!(envelope.data["text"], "42");
    assert_eq!(envelope.execution_id, "X");

    let sent: Value = serde_json::from_str(&remote.recv().await.unwrap()).unwrap();
    assert_eq!(sent["data"]["text"], "42");
    assert_eq!(sent["execution_id"], "X");
    assert_eq!(sent["type"], "input");
    assert_eq!(sent["event"], "user_input");
    assert!(sent["timestamp"].is_string());

    assert_eq!(h.manager.input_prompt(), Some("Enter number:"));
}

#[tokio::test]
async fn test_input_policy() {
    let mut h = Harness::new(config());
    let mut remote = h.open("X").await;
    assert_ok!(h.manager.submit_input("unprompted"));
    assert!(remote.recv().await.is_some());

    let mut h = Harness::new(config().with_input_policy(InputPolicy::RequirePrompt));
    let mut remote = h.open("X").await;
    let err = assert_err!(h.manager.submit_input("unprompted"));
    assert!(matches!(err, SessionError::Prompt(_)));
    assert!(remote.try_recv().is_none());

    h.deliver(&remote, &prompt_frame("X", "Go?")).await;
    assert_ok!(h.manager.submit_input("yes"));
}

#[tokio::test]
async fn test_send_message_stamps_payload() {
    let mut h = Harness::new(config());
    let mut remote = h.open("X").await;

    let payload = json!({ "action": "ping", "execution_id": "spoofed" });
    let Value::Object(payload) = payload else {
        unreachable!()
    };
    assert_ok!(h.manager.send_message(payload));

    let sent: Value = serde_json::from_str(&remote.recv().await.unwrap()).unwrap();
    assert_eq!(sent["action"], "ping");
    assert_eq!(sent["execution_id"], "X");
}

#[tokio::test]
async fn test_sending_requires_session_and_open_channel() {
    let mut h = Harness::new(config());
    assert!(matches!(
        h.manager.submit_input("x"),
        Err(SessionError::NotInitialized)
    ));

    assert_ok!(h.manager.connect("X").await);
    assert_eq!(h.manager.connection_state(), ConnectionState::Connecting);
    assert!(matches!(
        h.manager.submit_input("x"),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_frames_after_close_are_rejected() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    remote.close(Some("done")).unwrap();
    assert_eq!(
        h.manager.recv().await,
        Some(SessionEvent::Closed {
            reason: Some("done".into())
        })
    );
    assert_eq!(h.manager.connection_state(), ConnectionState::Closed);
    assert_eq!(h.manager.status().kind, StatusKind::Warning);
    assert!(remote.is_client_closed());
    assert_eq!(h.manager.recv().await, None);

    let event = h
        .manager
        .handle_signal(TransportSignal::Frame(stdout_frame("X", "late")));
    assert_eq!(event, SessionEvent::Frame(FrameDisposition::Rejected));
    assert!(h.manager.history().is_empty());
    assert!(h.manager.output().is_empty());
    assert!(matches!(
        h.manager.submit_input("x"),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_transport_error_is_terminal() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;

    remote.fail("connection reset").unwrap();
    assert_eq!(
        h.manager.recv().await,
        Some(SessionEvent::Errored("connection reset".into()))
    );
    assert_eq!(h.manager.connection_state(), ConnectionState::Errored);
    assert_eq!(
        h.manager.status().message,
        "WebSocket error occurred: connection reset"
    );
    assert_eq!(h.manager.recv().await, None);
}

#[tokio::test]
async fn test_idle_timeout_errors_session() {
    let mut h = Harness::new(config().with_idle_timeout(Duration::from_millis(50)));
    let _remote = h.open("X").await;

    assert!(matches!(
        h.manager.recv().await,
        Some(SessionEvent::Errored(_))
    ));
    assert_eq!(h.manager.connection_state(), ConnectionState::Errored);
    assert_eq!(h.manager.status().kind, StatusKind::Error);
}

#[tokio::test]
async fn test_idle_clock_survives_cancelled_recv() {
    let mut h = Harness::new(config().with_idle_timeout(Duration::from_millis(150)));
    let _remote = h.open("X").await;

    let mut polls = 0;
    let event = loop {
        polls += 1;
        assert!(polls <= 20, "idle timeout restarted by cancelled recv");
        if let Ok(event) = tokio::time::timeout(Duration::from_millis(30), h.manager.recv()).await
        {
            break event;
        }
    };

    assert!(matches!(event, Some(SessionEvent::Errored(_))));
    assert_eq!(h.manager.connection_state(), ConnectionState::Errored);
}

#[tokio::test]
async fn test_start_session_submits_after_handshake() {
    let mut h = Harness::new(config().with_client_id("cli"));
    let execution_id = assert_ok!(
        h.manager
            .start_session(&JobDescriptor::new("scripts/hello.py"))
            .await
    );

    let remote = h.remotes.recv().await.unwrap();
    assert_eq!(
        remote.query("execution_id").as_deref(),
        Some(execution_id.as_str())
    );
    assert_eq!(remote.query("role").as_deref(), Some("frontend"));

    let requests = h.submitter.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].s3_key, "scripts/hello.py");
    assert_eq!(requests[0].execution_id, execution_id);
    assert_eq!(requests[0].output_destination, "websocket");
    assert_eq!(requests[0].output_config.websocket_url, BASE_URL);
    assert_eq!(requests[0].output_config.client_id, "cli");

    assert_eq!(h.manager.connection_state(), ConnectionState::Connecting);
    assert_eq!(h.manager.recv().await, Some(SessionEvent::Opened));
    assert!(h.manager.is_connected());
    assert_eq!(h.manager.execution_id(), Some(execution_id.as_str()));
}

#[tokio::test]
async fn test_start_session_supersedes_previous() {
    let mut h = Harness::new(config());
    let first_id = assert_ok!(
        h.manager
            .start_session(&JobDescriptor::new("scripts/a.py"))
            .await
    );
    let first = h.remotes.recv().await.unwrap();
    h.manager.recv().await;
    h.deliver(&first, &stdout_frame(&first_id, "from a")).await;
    h.deliver(&first, &prompt_frame(&first_id, "Continue?")).await;
    assert_eq!(h.manager.output().len(), 1);

    let second_id = assert_ok!(
        h.manager
            .start_session(&JobDescriptor::new("scripts/b.py"))
            .await
    );
    let second = h.remotes.recv().await.unwrap();

    assert_ne!(first_id, second_id);
    assert!(first.is_client_closed());
    assert_eq!(second.live_at_open(), 0);
    assert_eq!(h.connector.live_channels(), 1);
    assert!(h.manager.output().is_empty());
    assert!(h.manager.history().is_empty());
    assert_eq!(h.manager.input_prompt(), None);
    assert!(first.send_frame(stdout_frame(&first_id, "stale")).is_err());

    h.manager.recv().await;
    h.deliver(&second, &stdout_frame(&first_id, "stale")).await;
    assert!(h.manager.output().is_empty());
    assert_eq!(h.submitter.requests().len(), 2);
}

#[tokio::test]
async fn test_superseded_channel_reports_disconnect() {
    let mut h = Harness::new(config());
    assert_ok!(
        h.manager
            .start_session(&JobDescriptor::new("scripts/a.py"))
            .await
    );
    let _first = h.remotes.recv().await.unwrap();
    h.manager.recv().await;

    let mut updates = h.manager.subscribe();
    assert_ok!(
        h.manager
            .start_session(&JobDescriptor::new("scripts/b.py"))
            .await
    );

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    let disconnected = seen
        .iter()
        .position(|u| {
            *u == SessionUpdate::Connection {
                state: ConnectionState::Disconnected,
            }
        })
        .unwrap();
    let started = seen
        .iter()
        .position(|u| matches!(u, SessionUpdate::SessionStarted { .. }))
        .unwrap();
    assert!(disconnected < started);
    assert!(seen.iter().any(|u| matches!(
        u,
        SessionUpdate::Status { status }
            if status.message == "Disconnected from WebSocket server"
    )));
}

#[tokio::test]
async fn test_rejected_job_keeps_channel() {
    let mut h = Harness::with_submitter(config(), RecordingSubmitter::rejecting("queue full"));
    let err = assert_err!(
        h.manager
            .start_session(&JobDescriptor::new("scripts/hello.py"))
            .await
    );
    assert!(matches!(err, SessionError::Submission(ref reason) if reason == "queue full"));
    assert_eq!(h.manager.status().kind, StatusKind::Error);
    assert_eq!(
        h.manager.status().message,
        "Failed to start script: queue full"
    );

    let _remote = h.remotes.recv().await.unwrap();
    assert_eq!(h.manager.recv().await, Some(SessionEvent::Opened));
    assert!(h.manager.is_connected());
}

#[tokio::test]
async fn test_blank_script_key_is_not_submitted() {
    let mut h = Harness::new(config());
    let err = assert_err!(h.manager.start_session(&JobDescriptor::new("  ")).await);
    assert!(matches!(err, SessionError::Submission(_)));
    assert!(h.submitter.requests().is_empty());
}

#[tokio::test]
async fn test_refused_handshake_skips_submission() {
    let mut h = Harness::new(config());
    h.connector.refuse_next("403 Forbidden");

    let err = assert_err!(
        h.manager
            .start_session(&JobDescriptor::new("scripts/hello.py"))
            .await
    );
    assert!(matches!(err, SessionError::Channel(_)));
    assert_eq!(h.manager.connection_state(), ConnectionState::Errored);
    assert!(h.manager.status().message.starts_with("Connection error:"));
    assert!(h.submitter.requests().is_empty());
}

#[tokio::test]
async fn test_disconnect_and_clear() {
    let mut h = Harness::new(config());
    let remote = h.open("X").await;
    h.deliver(&remote, &stdout_frame("X", "one")).await;

    h.manager.clear_output();
    assert!(h.manager.output().is_empty());
    assert_eq!(h.manager.history().len(), 1);
    h.manager.clear_history();
    assert!(h.manager.history().is_empty());

    h.manager.disconnect();
    assert!(remote.is_client_closed());
    assert_eq!(h.manager.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        h.manager.status().message,
        "Disconnected from WebSocket server"
    );
}

#[tokio::test]
async fn test_snapshot_and_updates() {
    let mut h = Harness::new(config());
    let mut updates = h.manager.subscribe();
    let remote = h.open("X").await;
    h.deliver(&remote, &stdout_frame("X", "hello")).await;
    h.deliver(&remote, &prompt_frame("X", "Name?")).await;

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    assert!(seen.contains(&SessionUpdate::Connection {
        state: ConnectionState::Open
    }));
    assert!(seen.contains(&SessionUpdate::Output {
        stream: Stream::Stdout,
        line: "hello".into()
    }));
    assert!(seen.contains(&SessionUpdate::Prompt {
        prompt: Some("Name?".into())
    }));
    assert_eq!(
        seen.iter()
            .filter(|u| matches!(u, SessionUpdate::History { .. }))
            .count(),
        2
    );

    let snapshot = serde_json::to_value(h.manager.snapshot()).unwrap();
    assert_eq!(snapshot["isConnected"], true);
    assert_eq!(snapshot["executionId"], "X");
    assert_eq!(snapshot["inputPrompt"], "Name?");
    assert_eq!(snapshot["output"]["stdout"][0], "hello");
    assert_eq!(snapshot["messageHistory"].as_array().unwrap().len(), 2);
}

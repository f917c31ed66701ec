use std::{cell::RefCell, time::Duration};

use loopdeck_core::{RelayClient, RelayError, RelayTransport, SendAudioResponse};

/// Scripted transport: plays back a fixed sequence of attempt outcomes and
/// records what it was asked to send. Implemented on `&Self` so the test
/// keeps a handle for inspection after the client takes the transport.
struct ScriptedTransport {
    outcomes: RefCell<Vec<Result<SendAudioResponse, RelayError>>>,
    calls: RefCell<Vec<(String, usize, String)>>,
}

impl ScriptedTransport {
    fn new(outcomes: Vec<Result<SendAudioResponse, RelayError>>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl RelayTransport for &ScriptedTransport {
    fn post_audio(
        &self,
        chat_id: &str,
        audio: &[u8],
        filename: &str,
    ) -> Result<SendAudioResponse, RelayError> {
        self.calls
            .borrow_mut()
            .push((chat_id.to_string(), audio.len(), filename.to_string()));
        let mut outcomes = self.outcomes.borrow_mut();
        if outcomes.is_empty() {
            Err(RelayError::Request("script exhausted".to_string()))
        } else {
            outcomes.remove(0)
        }
    }
}

fn accepted() -> Result<SendAudioResponse, RelayError> {
    Ok(SendAudioResponse {
        ok: true,
        description: None,
    })
}

fn rejected(description: &str) -> Result<SendAudioResponse, RelayError> {
    Ok(SendAudioResponse {
        ok: false,
        description: Some(description.to_string()),
    })
}

fn client(transport: &ScriptedTransport) -> RelayClient<&ScriptedTransport> {
    RelayClient::new(transport).with_retry(3, Duration::ZERO)
}

#[test]
fn first_attempt_success_does_not_retry() {
    let transport = ScriptedTransport::new(vec![accepted()]);
    let response = client(&transport)
        .send_audio("12345", b"clip-bytes", "recording.wav")
        .expect("delivery succeeds");
    assert!(response.ok);
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn transient_failures_retry_until_success() {
    let transport = ScriptedTransport::new(vec![
        Err(RelayError::Request("connection reset".to_string())),
        Err(RelayError::Server {
            status: 502,
            body: "bad gateway".to_string(),
        }),
        accepted(),
    ]);

    let response = client(&transport)
        .send_audio("12345", b"clip-bytes", "recording.wav")
        .expect("third attempt succeeds");
    assert!(response.ok);
    assert_eq!(transport.call_count(), 3);
}

#[test]
fn attempts_are_bounded() {
    let transport = ScriptedTransport::new(vec![
        Err(RelayError::Request("timeout".to_string())),
        Err(RelayError::Request("timeout".to_string())),
        Err(RelayError::Request("timeout".to_string())),
        accepted(),
    ]);

    match client(&transport).send_audio("12345", b"clip-bytes", "recording.wav") {
        Err(RelayError::AllAttemptsFailed {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("timeout"));
        }
        other => panic!("expected AllAttemptsFailed, got {other:?}"),
    }
    // The fourth scripted success was never reachable.
    assert_eq!(transport.call_count(), 3);
}

#[test]
fn application_level_rejection_counts_as_a_failed_attempt() {
    let transport =
        ScriptedTransport::new(vec![rejected("chat not found"), accepted()]);

    let response = client(&transport)
        .send_audio("12345", b"clip-bytes", "recording.wav")
        .expect("retry after rejection succeeds");
    assert!(response.ok);
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn rejection_description_survives_into_the_final_error() {
    let transport = ScriptedTransport::new(vec![
        rejected("bot was blocked"),
        rejected("bot was blocked"),
        rejected("bot was blocked"),
    ]);

    match client(&transport).send_audio("12345", b"clip-bytes", "recording.wav") {
        Err(RelayError::AllAttemptsFailed { last_error, .. }) => {
            assert!(last_error.contains("bot was blocked"));
        }
        other => panic!("expected AllAttemptsFailed, got {other:?}"),
    }
}

#[test]
fn missing_chat_id_never_reaches_the_transport() {
    let transport = ScriptedTransport::new(vec![accepted()]);
    let client = client(&transport);

    for chat_id in ["", "   "] {
        let error = client
            .send_audio(chat_id, b"clip-bytes", "recording.wav")
            .expect_err("blank chat id is rejected locally");
        assert!(matches!(error, RelayError::MissingChatId));
    }
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn transport_receives_the_payload_unchanged() {
    let transport = ScriptedTransport::new(vec![accepted()]);
    RelayClient::new(&transport)
        .with_retry(1, Duration::ZERO)
        .send_audio("777", &[1, 2, 3, 4], "take.mp3")
        .expect("delivery succeeds");

    let calls = transport.calls.borrow();
    assert_eq!(
        calls.as_slice(),
        &[("777".to_string(), 4, "take.mp3".to_string())]
    );
}

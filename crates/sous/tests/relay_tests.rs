//! Integration tests for the streaming relay pipeline
//!
//! Tests terminal-frame guarantees, reassembly determinism across chunk
//! boundaries, progress cadence, and malformed-line robustness.

use futures::StreamExt;

use sous::relay::{ChatRequest, FrameSink, Message, RelayEvent, RelayOutcome, Role, run_relay};
use sous::testing::{ScriptedConnector, content_line, provider_stream};

// =============================================================================
// Test Fixtures
// =============================================================================

fn test_request() -> ChatRequest {
    ChatRequest::new(
        "You are a helpful chef.",
        vec![Message::new(Role::User, "What should I cook tonight?")],
    )
}

/// Run a relay against `connector` and collect every frame the client sees
async fn relay(connector: ScriptedConnector) -> (RelayOutcome, Vec<RelayEvent>) {
    let (sink, frames) = FrameSink::channel(8);
    let collector = tokio::spawn(async move {
        frames
            .map(|frame| {
                let frame = frame.unwrap_or_else(|never| match never {});
                let text = String::from_utf8(frame.to_vec()).expect("frames are UTF-8");
                assert!(text.ends_with("\n\n"), "frame not terminated: {text:?}");
                RelayEvent::from_frame(&text).expect("frame parses")
            })
            .collect::<Vec<_>>()
            .await
    });

    let outcome = run_relay(&connector, &test_request(), sink, None).await;
    (outcome, collector.await.unwrap())
}

fn final_text(events: &[RelayEvent]) -> &str {
    match events.last() {
        Some(RelayEvent::Completion { full_text }) => full_text,
        other => panic!("expected completion last, got {other:?}"),
    }
}

fn progress_tokens(events: &[RelayEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            RelayEvent::Progress { tokens, .. } => Some(*tokens),
            _ => None,
        })
        .collect()
}

fn assert_single_terminal_last(events: &[RelayEvent]) {
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals, vec![events.len() - 1], "events: {events:?}");
}

// =============================================================================
// Scenario Tests
// =============================================================================

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_deltas_split_across_unaligned_chunks() {
        let body = provider_stream(&["Hel", "lo wor", "ld"]);
        let bytes = body.as_bytes();
        // Three chunks whose boundaries fall inside lines
        let first = 17;
        let second = bytes.len() / 2 + 3;
        let connector = ScriptedConnector::chunks(vec![
            bytes[..first].to_vec(),
            bytes[first..second].to_vec(),
            bytes[second..].to_vec(),
        ]);

        let (outcome, events) = relay(connector).await;

        assert_eq!(outcome, RelayOutcome::Completed { tokens: 3 });
        assert_eq!(final_text(&events), "Hello world");
        assert_single_terminal_last(&events);
    }

    #[tokio::test]
    async fn test_rate_limited_handshake() {
        let connector = ScriptedConnector::status(429, "Rate limit reached for model");

        let (outcome, events) = relay(connector).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            RelayEvent::Error { message } => assert!(message.contains("429")),
            other => panic!("expected error frame, got {other:?}"),
        }
        assert!(matches!(outcome, RelayOutcome::Failed { .. }));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, RelayEvent::Completion { .. }))
        );
    }

    #[tokio::test]
    async fn test_twelve_deltas_progress_after_fifth_and_tenth() {
        let deltas: Vec<String> = (1..=12).map(|i| format!("w{i} ")).collect();
        let delta_refs: Vec<&str> = deltas.iter().map(String::as_str).collect();
        let connector = ScriptedConnector::chunks(vec![provider_stream(&delta_refs)]);

        let (_, events) = relay(connector).await;

        assert_eq!(events.len(), 3);
        assert_eq!(progress_tokens(&events), vec![5, 10]);

        let elapsed: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                RelayEvent::Progress { elapsed_secs, .. } => Some(*elapsed_secs),
                _ => None,
            })
            .collect();
        assert!(elapsed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(final_text(&events), deltas.concat());
    }
}

// =============================================================================
// Reassembly Determinism Tests
// =============================================================================

mod determinism_tests {
    use super::*;

    fn recipe_stream() -> String {
        provider_stream(&[
            "Crème ", "brûlée ", "needs ", "cream, ", "sugar, ", "eggs ", "and ", "vanilla 🍮",
        ])
    }

    #[tokio::test]
    async fn test_every_chunk_size_yields_same_events() {
        let body = recipe_stream();
        let (_, reference) = relay(ScriptedConnector::chunks(vec![body.clone()])).await;

        for size in [1, 2, 3, 5, 7, 13, 64, 257] {
            let (_, events) = relay(ScriptedConnector::split_every(body.as_bytes(), size)).await;
            let texts: Vec<_> = events
                .iter()
                .map(|e| match e {
                    RelayEvent::Progress {
                        tokens, preview, ..
                    } => (Some(*tokens), preview.clone()),
                    RelayEvent::Completion { full_text } => (None, full_text.clone()),
                    RelayEvent::Error { message } => panic!("unexpected error: {message}"),
                })
                .collect();
            let reference_texts: Vec<_> = reference
                .iter()
                .map(|e| match e {
                    RelayEvent::Progress {
                        tokens, preview, ..
                    } => (Some(*tokens), preview.clone()),
                    RelayEvent::Completion { full_text } => (None, full_text.clone()),
                    RelayEvent::Error { message } => panic!("unexpected error: {message}"),
                })
                .collect();

            assert_eq!(texts, reference_texts, "chunk size {size}");
        }

        assert_eq!(
            final_text(&reference),
            "Crème brûlée needs cream, sugar, eggs and vanilla 🍮"
        );
    }

    #[tokio::test]
    async fn test_crlf_line_endings() {
        let body = provider_stream(&["a", "b"]).replace('\n', "\r\n");
        let (_, events) = relay(ScriptedConnector::split_every(body.as_bytes(), 4)).await;
        assert_eq!(final_text(&events), "ab");
    }

    #[tokio::test]
    async fn test_unterminated_trailing_line_is_dropped() {
        let mut body = provider_stream(&["kept"]);
        body.push_str(content_line("lost").trim_end());

        let (outcome, events) = relay(ScriptedConnector::chunks(vec![body])).await;

        assert_eq!(outcome, RelayOutcome::Completed { tokens: 1 });
        assert_eq!(final_text(&events), "kept");
    }
}

// =============================================================================
// Robustness Tests
// =============================================================================

mod robustness_tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_interior_line_is_skipped() {
        let mut body = String::new();
        body.push_str(&content_line("Chop "));
        body.push_str("data: {\"choices\":[{\"delta\":{\"content\":\n\n");
        body.push_str("data: this is not json\n\n");
        body.push_str(&content_line("onions."));
        body.push_str("data: [DONE]\n\n");

        let (outcome, events) = relay(ScriptedConnector::chunks(vec![body])).await;

        assert_eq!(outcome, RelayOutcome::Completed { tokens: 2 });
        assert_eq!(final_text(&events), "Chop onions.");
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, RelayEvent::Error { .. }))
        );
    }

    #[tokio::test]
    async fn test_non_data_lines_ignored() {
        let mut body = String::from(": keep-alive\n\nevent: message\n");
        body.push_str(&content_line("ok"));
        body.push_str("id: 42\nretry: 1000\n\n");

        let (_, events) = relay(ScriptedConnector::chunks(vec![body])).await;
        assert_eq!(final_text(&events), "ok");
    }

    #[tokio::test]
    async fn test_content_after_done_sentinel_still_counts() {
        // Exhaustion, not the sentinel, ends the relay
        let mut body = provider_stream(&["before "]);
        body.push_str(&content_line("after"));

        let (_, events) = relay(ScriptedConnector::chunks(vec![body])).await;
        assert_eq!(final_text(&events), "before after");
    }

    #[tokio::test]
    async fn test_read_error_mid_stream_is_single_error_frame() {
        let chunks: Vec<String> = (0..7).map(|i| content_line(&i.to_string())).collect();
        let connector = ScriptedConnector::chunks_then_error(chunks, "connection reset by peer");

        let (outcome, events) = relay(connector).await;

        assert_single_terminal_last(&events);
        assert_eq!(progress_tokens(&events), vec![5]);
        assert_eq!(
            events.last(),
            Some(&RelayEvent::Error {
                message: "Upstream stream error: connection reset by peer".to_string()
            })
        );
        assert!(matches!(outcome, RelayOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_delta_kept_with_replacement_character() {
        let mut body = content_line("Order a ").into_bytes();
        body.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xff\"}}]}\n\n");
        body.extend_from_slice(content_line(" au lait").as_bytes());

        let (outcome, events) = relay(ScriptedConnector::split_every(&body, 11)).await;

        assert_eq!(outcome, RelayOutcome::Completed { tokens: 3 });
        assert!(final_text(&events).contains("caf\u{FFFD}"));
        assert_eq!(final_text(&events), "Order a caf\u{FFFD} au lait");
    }

    #[tokio::test]
    async fn test_endless_line_ends_with_error_frame() {
        let mut chunks = vec![content_line("Preheat ").into_bytes()];
        chunks.extend((0..1100).map(|_| vec![b'x'; 1024]));
        let connector = ScriptedConnector::chunks(chunks);

        let (outcome, events) = relay(connector).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RelayEvent::Error { message } if message.contains("without a separator")
        ));
        assert!(matches!(outcome, RelayOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_role_and_finish_chunks_do_not_count_as_tokens() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        let (outcome, events) = relay(ScriptedConnector::chunks(vec![body])).await;

        assert_eq!(outcome, RelayOutcome::Completed { tokens: 1 });
        assert_eq!(final_text(&events), "Hi");
    }
}

// =============================================================================
// Backpressure Tests
// =============================================================================

mod backpressure_tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_slow_consumer_receives_every_frame() {
        let deltas: Vec<String> = (0..40).map(|i| format!("{i},")).collect();
        let delta_refs: Vec<&str> = deltas.iter().map(String::as_str).collect();
        let connector = ScriptedConnector::chunks(vec![provider_stream(&delta_refs)]);

        // Capacity 1: the producer must wait for every frame to be taken
        let (sink, mut frames) = FrameSink::channel(1);
        let relay = tokio::spawn(async move {
            run_relay(&connector, &test_request(), sink, None).await
        });

        let mut events = Vec::new();
        while let Some(frame) = frames.next().await {
            tokio::time::sleep(Duration::from_millis(2)).await;
            let frame = frame.unwrap_or_else(|never| match never {});
            events.push(RelayEvent::from_frame(std::str::from_utf8(&frame).unwrap()).unwrap());
        }

        assert_eq!(relay.await.unwrap(), RelayOutcome::Completed { tokens: 40 });
        assert_eq!(progress_tokens(&events), vec![5, 10, 15, 20, 25, 30, 35, 40]);
        assert_eq!(final_text(&events), deltas.concat());
    }
}

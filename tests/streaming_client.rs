// tests/streaming_client.rs
// ChatStreamClient against a mock Ollama server


use std::sync::Arc;
use std::time::Duration;
use test_helpers::{MockOllama, Reply, chunks, content_line, done_line, ollama_routes};
use tokio::sync::mpsc;
use tutor_stream::llm::{ChatStreamClient, StreamOutcome, Turn};

fn collect_into(seen: &mut Vec<String>) -> impl FnMut(&str) + '_ {
    move |c| seen.push(c.to_string())
}

#[tokio::test]
async fn test_streams_chunks_in_order() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::Stream(chunks(&[
            content_line("Hel"),
            content_line("lo"),
            content_line(", world"),
            done_line(),
        ]))
    }))
    .await;

    let client = ChatStreamClient::with_model(&server.base_url, "test-model");
    let mut seen = Vec::new();
    let outcome = client
        .send(&[Turn::user("hi")], collect_into(&mut seen))
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed("Hello, world".into()));
    assert_eq!(seen, vec!["Hel", "lo", ", world"]);
    assert!(!client.is_busy());

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    let body = requests[0].json();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn test_lines_split_across_http_chunks() {
    let body = format!("{}{}{}", content_line("naïve "), content_line("café"), done_line());
    let bytes = body.into_bytes();
    // Cut inside the multi-byte 'ï' and in the middle of the second line
    let cut_a = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
    let cut_b = cut_a + 30;
    let parts = vec![
        bytes[..cut_a].to_vec(),
        bytes[cut_a..cut_b].to_vec(),
        bytes[cut_b..].to_vec(),
    ];

    let server = MockOllama::start(ollama_routes(move |_| Reply::Stream(parts.clone()))).await;
    let client = ChatStreamClient::new(&server.base_url);

    let outcome = client.send(&[Turn::user("q")], |_| {}).await.unwrap();
    assert_eq!(outcome.text(), "naïve café");
}

#[tokio::test]
async fn test_done_stops_streaming() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::Stream(chunks(&[
            content_line("a"),
            format!("{}{}", done_line(), content_line("late")),
            content_line("later"),
        ]))
    }))
    .await;

    let client = ChatStreamClient::new(&server.base_url);
    let mut seen = Vec::new();
    let outcome = client
        .send(&[Turn::user("q")], collect_into(&mut seen))
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed("a".into()));
    assert_eq!(seen, vec!["a"]);
}

#[tokio::test]
async fn test_malformed_and_blank_lines_are_skipped() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::Stream(chunks(&[
            "not json at all\n".to_string(),
            "   \n".to_string(),
            content_line("ok"),
            "{\"message\": {\"content\": \n".to_string(),
            content_line("!"),
            done_line(),
        ]))
    }))
    .await;

    let client = ChatStreamClient::new(&server.base_url);
    let outcome = client.send(&[Turn::user("q")], |_| {}).await.unwrap();
    assert_eq!(outcome.text(), "ok!");
}

#[tokio::test]
async fn test_stream_without_done_completes_at_eof() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::Stream(chunks(&[content_line("partial"), "{\"trailing\":".to_string()]))
    }))
    .await;

    let client = ChatStreamClient::new(&server.base_url);
    let outcome = client.send(&[Turn::user("q")], |_| {}).await.unwrap();
    assert_eq!(outcome, StreamOutcome::Completed("partial".into()));
}

#[tokio::test]
async fn test_server_error_status_is_transport_error() {
    let server = MockOllama::start(ollama_routes(|_| Reply::Status(500))).await;
    let client = ChatStreamClient::new(&server.base_url).with_fallback_message("(no answer)");

    let mut seen = Vec::new();
    let err = client
        .send(&[Turn::user("q")], collect_into(&mut seen))
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(seen, vec!["(no answer)"]);
    assert!(!client.is_busy());
}

#[tokio::test]
async fn test_dropped_stream_is_transport_error() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::StreamThenDrop(chunks(&[content_line("He")]))
    }))
    .await;
    let client = ChatStreamClient::new(&server.base_url).with_fallback_message("(lost)");

    let mut seen = Vec::new();
    let err = client
        .send(&[Turn::user("q")], collect_into(&mut seen))
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(seen, vec!["He", "(lost)"]);
}

#[tokio::test]
async fn test_new_request_preempts_in_flight_one() {
    let server = MockOllama::start(ollama_routes(|req| {
        if req.last_message() == "first" {
            Reply::StreamThenHang(chunks(&[content_line("par")]))
        } else {
            Reply::Stream(chunks(&[content_line("second reply"), done_line()]))
        }
    }))
    .await;

    let client = Arc::new(ChatStreamClient::new(&server.base_url));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let first = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send(&[Turn::user("first")], move |c| {
                    let _ = tx.send(c.to_string());
                })
                .await
        })
    };

    // Wait until the first stream is actually producing
    let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(got.as_deref(), Some("par"));
    assert!(client.is_busy());

    let second = client.send(&[Turn::user("second")], |_| {}).await.unwrap();
    assert_eq!(second, StreamOutcome::Completed("second reply".into()));

    let first = tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first, StreamOutcome::Cancelled("par".into()));
    assert!(!client.is_busy());

    assert_eq!(server.paths(), vec!["/api/chat", "/api/shutdown", "/api/chat"]);
}

#[tokio::test]
async fn test_explicit_cancel_returns_partial() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::StreamThenHang(chunks(&[content_line("thinking"), content_line("...")]))
    }))
    .await;

    let client = Arc::new(ChatStreamClient::new(&server.base_url));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send(&[Turn::user("q")], move |c| {
                    let _ = tx.send(c.to_string());
                })
                .await
        })
    };

    assert_eq!(rx.recv().await.as_deref(), Some("thinking"));
    assert_eq!(rx.recv().await.as_deref(), Some("..."));

    assert!(client.cancel().await);
    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome, StreamOutcome::Cancelled("thinking...".into()));
    assert!(server.paths().contains(&"/api/shutdown".to_string()));
}

#[tokio::test]
async fn test_probe() {
    let server = MockOllama::start(ollama_routes(|_| Reply::Status(200))).await;
    let client = ChatStreamClient::new(&server.base_url);
    assert!(client.probe().await);
    assert_eq!(server.paths(), vec!["/api/tags"]);

    let missing = MockOllama::start(|_| Reply::Status(404)).await;
    assert!(!ChatStreamClient::new(&missing.base_url).probe().await);

    assert!(!ChatStreamClient::new("http://127.0.0.1:1").probe().await);
}

#[tokio::test]
async fn test_content_on_done_line_is_ignored() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::Stream(chunks(&[
            content_line("a"),
            "{\"message\":{\"content\":\"TAIL\"},\"done\":true}\n".to_string(),
        ]))
    }))
    .await;

    let client = ChatStreamClient::new(&server.base_url);
    let mut seen = Vec::new();
    let outcome = client
        .send(&[Turn::user("q")], collect_into(&mut seen))
        .await
        .unwrap();

    assert_eq!(seen, vec!["a"]);
    assert_eq!(outcome, StreamOutcome::Completed("a".into()));
}

// ============================================================================
// Cancellation edges
// ============================================================================

#[tokio::test]
async fn test_cancel_before_server_answers() {
    let server = MockOllama::start(ollama_routes(|_| Reply::Silent)).await;
    let client = Arc::new(ChatStreamClient::new(&server.base_url));

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            let outcome = client
                .send(&[Turn::user("q")], |c| seen.push(c.to_string()))
                .await;
            (outcome, seen)
        })
    };

    server.wait_for("/api/chat").await;
    assert!(client.is_busy());
    assert!(client.cancel().await);

    let (outcome, seen) = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.unwrap(), StreamOutcome::Cancelled(String::new()));
    assert!(seen.is_empty());
    assert!(!client.is_busy());
}

#[tokio::test]
async fn test_dropped_send_releases_slot() {
    let server = MockOllama::start(ollama_routes(|_| {
        Reply::StreamThenHang(chunks(&[content_line("half")]))
    }))
    .await;
    let client = Arc::new(ChatStreamClient::new(&server.base_url));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send(&[Turn::user("q")], move |c| {
                    let _ = tx.send(c.to_string());
                })
                .await
        })
    };

    assert_eq!(rx.recv().await.as_deref(), Some("half"));
    assert!(client.is_busy());

    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());
    assert!(!client.is_busy());
    // Nothing left to cancel
    assert!(!client.cancel().await);
}

#[tokio::test]
async fn test_preempted_while_stopping_previous_generation() {
    // Shutdown never answers, so the second request sits in the stop phase
    let server = MockOllama::start(|req| match req.path.as_str() {
        "/api/shutdown" => Reply::Silent,
        "/api/chat" if req.last_message() == "first" => {
            Reply::StreamThenHang(chunks(&[content_line("one")]))
        }
        "/api/chat" => Reply::Stream(chunks(&[content_line("three"), done_line()])),
        _ => Reply::Status(404),
    })
    .await;
    let client = Arc::new(ChatStreamClient::new(&server.base_url));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let spawn_send = |text: &'static str| {
        let client = client.clone();
        tokio::spawn(async move { client.send(&[Turn::user(text)], |_| {}).await })
    };

    let first = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send(&[Turn::user("first")], move |c| {
                    let _ = tx.send(c.to_string());
                })
                .await
        })
    };
    assert_eq!(rx.recv().await.as_deref(), Some("one"));

    let second = spawn_send("second");
    server.wait_for("/api/shutdown").await;

    let third = spawn_send("third");

    // Well under the 3s shutdown timeout the second request is waiting on
    let second = tokio::time::timeout(Duration::from_secs(1), second)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.unwrap(), StreamOutcome::Cancelled(String::new()));

    let third = tokio::time::timeout(Duration::from_secs(10), third)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.unwrap(), StreamOutcome::Completed("three".into()));

    let first = first.await.unwrap().unwrap();
    assert!(first.is_cancelled());
    // The second request never reached /api/chat
    assert_eq!(server.count("/api/chat"), 2);
    assert!(!client.is_busy());
}

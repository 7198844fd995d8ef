fn main() {
    println!("Run `cargo test -p live-session` to exercise the client against a local server.");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::Value;
    use tokio_tungstenite::tungstenite::Message;

    use retether_client::{
        ClientConfig, ConnectionManager, ConnectionState, Consumer, RetryPolicy, StaticToken,
    };
    use retether_test_server::{TestServer, TestServerConfig};

    const TOKEN: &str = "sekrit";

    /// Counts lifecycle events and collects decoded payloads.
    #[derive(Clone, Default)]
    struct Recording {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        errors: Arc<AtomicUsize>,
        messages: Arc<Mutex<Vec<Value>>>,
    }

    impl Recording {
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        fn errors(&self) -> usize {
            self.errors.load(Ordering::SeqCst)
        }

        fn messages(&self) -> Vec<Value> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl Consumer for Recording {
        fn on_open(&self) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }

        fn on_message(&self, payload: &Value) {
            self.messages.lock().unwrap().push(payload.clone());
        }

        fn on_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _description: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn start_server(port: u16) -> (Arc<TestServer>, tokio::task::JoinHandle<()>, u16) {
        let config = TestServerConfig {
            port,
            token: Some(TOKEN.to_string()),
            ..Default::default()
        };
        let server = TestServer::new(config);
        let runner = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            runner.run().await.unwrap();
        });

        let mut bound = server.port().await;
        for _ in 0..50 {
            if bound > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            bound = server.port().await;
        }
        assert!(bound > 0, "server failed to bind");
        (server, handle, bound)
    }

    fn manager_for(
        port: u16,
        max_attempts: u32,
        interval_ms: u64,
        consumer: Recording,
    ) -> ConnectionManager {
        let config = ClientConfig {
            endpoint: format!("ws://127.0.0.1:{port}/ws/test/"),
            retry: RetryPolicy {
                max_attempts,
                interval: Duration::from_millis(interval_ms),
            },
        };
        ConnectionManager::new(config, Arc::new(StaticToken::new(TOKEN)), consumer)
    }

    /// Polls `condition` every 50ms for up to `seconds`. Returns Err on
    /// timeout so callers can assert or ignore.
    async fn wait_until(mut condition: impl FnMut() -> bool, seconds: u64) -> Result<(), ()> {
        for _ in 0..(seconds * 20) {
            if condition() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Err(())
    }

    /// Returns a port with nothing listening on it.
    async fn dead_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn connects_and_receives_greeting() {
        let (server, handle, port) = start_server(0).await;
        let recording = Recording::default();
        let manager = manager_for(port, 3, 100, recording.clone());

        manager.connect();
        wait_until(|| manager.state() == ConnectionState::Connected, 5)
            .await
            .expect("should connect");
        wait_until(|| recording.messages().len() >= 2, 5)
            .await
            .expect("should receive the greeting");

        let messages = recording.messages();
        assert_eq!(messages[0]["type"], "connection_established");
        assert_eq!(messages[1]["type"], "welcome");
        assert_eq!(recording.opens(), 1);
        assert_eq!(manager.status().last_message, Some(messages[1].clone()));

        // The greeting decodes into the shared reply type.
        let parsed: retether_protocol::Reply =
            serde_json::from_value(messages[0].clone()).unwrap();
        assert!(matches!(
            parsed,
            retether_protocol::Reply::ConnectionEstablished { .. }
        ));

        manager.shutdown();
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let (server, handle, port) = start_server(0).await;
        let recording = Recording::default();
        let manager = manager_for(port, 3, 100, recording.clone());

        manager.connect();
        wait_until(|| recording.messages().len() >= 2, 5)
            .await
            .expect("should receive the greeting");

        manager.send_text("echo", "ping me");
        wait_until(
            || {
                recording
                    .messages()
                    .iter()
                    .any(|m| m["type"] == "echo_response")
            },
            5,
        )
        .await
        .expect("should receive the echo");

        let messages = recording.messages();
        let echo = messages
            .iter()
            .find(|m| m["type"] == "echo_response")
            .unwrap();
        assert_eq!(echo["message"], "Echo: ping me");
        assert!(manager.status().last_error.is_none());

        manager.shutdown();
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn auth_probe_reflects_presented_token() {
        let (server, handle, port) = start_server(0).await;
        let recording = Recording::default();
        let manager = manager_for(port, 3, 100, recording.clone());

        manager.connect();
        wait_until(|| recording.messages().len() >= 2, 5)
            .await
            .expect("should receive the greeting");

        manager.send_text("test_auth", "");
        wait_until(
            || {
                recording
                    .messages()
                    .iter()
                    .any(|m| m["type"] == "auth_status")
            },
            5,
        )
        .await
        .expect("should receive the auth status");

        let messages = recording.messages();
        let status = messages.iter().find(|m| m["type"] == "auth_status").unwrap();
        assert_eq!(status["authenticated"], true);
        assert_eq!(status["username"], "testuser");

        manager.shutdown();
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn manual_disconnect_does_not_reconnect() {
        let (server, handle, port) = start_server(0).await;
        let recording = Recording::default();
        let manager = manager_for(port, 5, 100, recording.clone());

        manager.connect();
        wait_until(|| manager.state() == ConnectionState::Connected, 5)
            .await
            .expect("should connect");

        manager.disconnect();
        wait_until(|| manager.state() == ConnectionState::Disconnected, 5)
            .await
            .expect("should disconnect");

        // Several retry intervals pass without a reconnect.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(recording.opens(), 1);
        assert_eq!(recording.closes(), 1);
        assert_eq!(recording.errors(), 0);

        manager.shutdown();
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_retries_to_ceiling() {
        let port = dead_port().await;
        let recording = Recording::default();
        let manager = manager_for(port, 2, 100, recording.clone());

        manager.connect();

        // Initial attempt plus two retries, each failing the handshake.
        wait_until(|| recording.errors() >= 3, 5)
            .await
            .expect("three failed attempts");
        wait_until(|| manager.state() == ConnectionState::Disconnected, 5)
            .await
            .expect("should give up");

        // The ceiling holds: no further attempts fire.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(recording.errors(), 3);
        assert_eq!(recording.closes(), 3);
        assert_eq!(recording.opens(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        let error = manager.status().last_error.expect("error recorded");
        assert!(error.starts_with("WebSocket error: "), "{error}");

        manager.shutdown();
    }

    #[tokio::test]
    async fn server_shutdown_triggers_bounded_reconnects() {
        let (server, handle, port) = start_server(0).await;
        let recording = Recording::default();
        let manager = manager_for(port, 2, 100, recording.clone());

        manager.connect();
        wait_until(|| manager.state() == ConnectionState::Connected, 5)
            .await
            .expect("should connect");

        // Take the server away mid-session.
        server.shutdown();
        handle.await.unwrap();

        // One real closure, then two refused retries, then done.
        wait_until(|| recording.closes() >= 3, 5)
            .await
            .expect("closure plus two failed retries");
        wait_until(|| manager.state() == ConnectionState::Disconnected, 5)
            .await
            .expect("should give up");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(recording.opens(), 1);
        assert_eq!(recording.closes(), 3);
        assert_eq!(recording.errors(), 2);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.shutdown();
    }

    #[tokio::test]
    async fn successful_open_resets_the_retry_budget() {
        let (first, first_handle, port) = start_server(0).await;
        let recording = Recording::default();
        let manager = manager_for(port, 1, 300, recording.clone());

        manager.connect();
        wait_until(|| recording.opens() == 1, 5)
            .await
            .expect("first connect");

        // Drop the server; the client schedules its only retry.
        first.shutdown();
        first_handle.await.unwrap();

        // Bring a replacement up on the same port before the retry fires.
        let (second, second_handle, _) = start_server(port).await;
        wait_until(|| recording.opens() == 2, 5)
            .await
            .expect("reconnect to the replacement");

        // Drop the replacement too. Were the budget not reset by the
        // successful open, no further attempt would fire here.
        second.shutdown();
        second_handle.await.unwrap();

        wait_until(|| recording.closes() >= 3, 5)
            .await
            .expect("retry after the second loss");

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(recording.opens(), 2);
        assert_eq!(recording.closes(), 3);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.shutdown();
    }

    #[tokio::test]
    async fn disconnect_cancels_a_pending_retry() {
        let (server, handle, port) = start_server(0).await;
        let recording = Recording::default();
        let manager = manager_for(port, 5, 300, recording.clone());

        manager.connect();
        wait_until(|| manager.state() == ConnectionState::Connected, 5)
            .await
            .expect("should connect");

        server.shutdown();
        handle.await.unwrap();
        wait_until(
            || matches!(manager.state(), ConnectionState::Reconnecting { .. }),
            5,
        )
        .await
        .expect("retry should be pending");

        manager.disconnect();
        wait_until(|| manager.state() == ConnectionState::Disconnected, 5)
            .await
            .expect("should settle disconnected");

        // The cancelled timer never fires another attempt.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(recording.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.shutdown();
    }

    #[tokio::test]
    async fn sent_payload_round_trips_through_a_verbatim_echo() {
        // A peer that returns every text frame unchanged.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    ws.send(Message::Text(text)).await.unwrap();
                }
            }
        });

        let recording = Recording::default();
        let manager = manager_for(port, 3, 100, recording.clone());
        manager.connect();
        wait_until(|| recording.opens() == 1, 5)
            .await
            .expect("should connect");

        let payload = serde_json::json!({
            "type": "echo",
            "message": "round trip",
            "count": 3,
            "nested": { "flag": true, "items": [1, 2, 3] },
        });
        manager.send(payload.clone());

        wait_until(|| !recording.messages().is_empty(), 5)
            .await
            .expect("echo should arrive");
        assert_eq!(recording.messages()[0], payload);
        assert_eq!(manager.status().last_message, Some(payload));

        manager.shutdown();
        peer.abort();
    }

    #[tokio::test]
    async fn malformed_frame_leaves_the_connection_up() {
        // A bare-bones server that sends one invalid frame, then one
        // valid non-object payload, and holds the connection open.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("not-json{".into())).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            ws.send(Message::Text("42".into())).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let recording = Recording::default();
        let manager = manager_for(port, 3, 100, recording.clone());
        manager.connect();

        wait_until(|| manager.status().last_error.is_some(), 5)
            .await
            .expect("parse failure should be recorded");
        let status = manager.status();
        let error = status.last_error.unwrap();
        assert!(error.starts_with("failed to parse message: "), "{error}");
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(recording.messages().is_empty());

        // The connection survives and later valid payloads decode,
        // including bare scalars.
        wait_until(|| !recording.messages().is_empty(), 5)
            .await
            .expect("valid payload should still arrive");
        assert_eq!(recording.messages()[0], serde_json::json!(42));

        manager.shutdown();
        peer.abort();
    }
}

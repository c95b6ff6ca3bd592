//! Integration tests for libmu against a scripted fake server.

mod common;

use std::sync::Arc;

use libmu::{Connection, ConnectionState, Error, Verb, NO_ARGS};
use serde_json::{json, Value};

use common::{connect_recorded, fake_server, RecordingObserver, TEST_TIMEOUT};

#[tokio::test]
async fn ping_returns_normalized_mapping() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn.ping(NO_ARGS).await.expect("ping should succeed");

    assert_eq!(values.len(), 1);
    let pong = &values[0];
    assert_eq!(pong["pong"], "mu");
    assert_eq!(pong["pid"], json!(conn.pid()));
    assert_eq!(pong["props"], json!({"version": "1.12.0", "doccount": 3}));
    assert_eq!(conn.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn find_returns_every_frame() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn
        .find([("query", "hello"), ("maxnum", "10")])
        .await
        .expect("find should succeed");

    assert_eq!(
        values,
        vec![
            json!({
                "docid": 1,
                "subject": "hello world",
                "flags": ["seen", "replied"],
                "from": [["Ann", "ann@example.com"]],
            }),
            json!({"docid": 2, "subject": "second", "flags": null, "draft": true}),
            json!({"found": 2}),
        ]
    );
}

#[tokio::test]
async fn command_line_reaches_server_quoted() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn
        .execute("echo", [("subject", "hello world"), ("maildir", "/inbox")])
        .await
        .unwrap();

    assert_eq!(
        values,
        vec![json!({"echo": "cmd:echo subject:\"hello world\" maildir:/inbox"})]
    );
}

#[tokio::test]
async fn newline_in_value_cannot_start_another_command() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn
        .execute("echo", [("subject", "a\ncmd:ping")])
        .await
        .unwrap();

    assert_eq!(
        values,
        vec![json!({"echo": "cmd:echo subject:\"a\\ncmd:ping\""})]
    );

    // The next request still gets its own answer.
    let values = conn.ping(NO_ARGS).await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["pong"], "mu");
}

#[tokio::test]
async fn timeout_argument_is_not_sent_and_reverts() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn
        .execute("echo", [("timeout", "1"), ("query", "x")])
        .await
        .unwrap();

    assert_eq!(values, vec![json!({"echo": "cmd:echo query:x"})]);
    assert_eq!(conn.timeout(), TEST_TIMEOUT);
}

#[tokio::test]
async fn timeout_override_waits_for_slow_reply() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn
        .execute("slow", [("timeout", "2.5")])
        .await
        .unwrap();

    assert_eq!(values, vec![json!({"slow": true})]);
    assert_eq!(conn.timeout(), TEST_TIMEOUT);
    assert_eq!(conn.original_timeout(), TEST_TIMEOUT);
}

#[tokio::test]
async fn default_timeout_gives_up_on_slow_reply() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn.execute("slow", NO_ARGS).await.unwrap();

    assert!(values.is_empty(), "expected nothing yet, got {values:?}");
    assert_eq!(conn.restarts(), 0);
}

#[tokio::test]
async fn frame_split_across_reads_is_reassembled() {
    let observer = Arc::new(RecordingObserver::default());
    let mut conn = fake_server()
        .chunk_size(4)
        .observer(observer.clone())
        .connect()
        .await
        .unwrap();

    let values = conn.execute("split", NO_ARGS).await.unwrap();

    assert_eq!(values, vec![json!({"split": "done", "ok": true})]);
    assert!(observer.discards.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unframed_output_is_skipped() {
    let (mut conn, observer) = connect_recorded().await;

    let values = conn.execute("noise", NO_ARGS).await.unwrap();

    assert_eq!(values, vec![json!({"ok": true})]);
    assert_eq!(observer.discards.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_frame_becomes_null() {
    let (mut conn, observer) = connect_recorded().await;

    let values = conn.execute("malformed", NO_ARGS).await.unwrap();

    assert_eq!(values, vec![Value::Null, json!({"after": true})]);
    assert_eq!(observer.malformed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_verb_passes_server_error_through() {
    let (mut conn, _observer) = connect_recorded().await;

    let values = conn
        .execute(Verb::Custom("compose".into()), NO_ARGS)
        .await
        .unwrap();

    assert_eq!(
        values,
        vec![json!({"error": 1, "message": "unknown command"})]
    );
}

#[tokio::test]
async fn dead_server_is_restarted_transparently() {
    let (mut conn, observer) = connect_recorded().await;
    let old_pid = conn.pid();
    assert!(old_pid > 0);

    let values = conn.execute("crash", NO_ARGS).await.unwrap();

    // The partial frame from the dying server is thrown away.
    assert!(values.is_empty());
    assert_eq!(conn.restarts(), 1);
    let new_pid = conn.pid();
    assert!(new_pid > 0);
    assert_ne!(new_pid, old_pid);
    assert_eq!(observer.restarts(), vec![(old_pid, new_pid)]);
    assert_eq!(*observer.spawns.lock().unwrap(), vec![old_pid, new_pid]);
    assert!(observer
        .entered_states()
        .contains(&ConnectionState::ChildDead));
    assert_eq!(conn.state(), ConnectionState::Idle);

    // The replacement answers normally.
    let values = conn.ping(NO_ARGS).await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["pid"], json!(new_pid));
    assert_eq!(conn.restarts(), 1);
}

#[tokio::test]
async fn read_cycle_states_are_observable() {
    let (mut conn, observer) = connect_recorded().await;

    conn.ping(NO_ARGS).await.unwrap();

    assert_eq!(
        observer.entered_states(),
        vec![
            ConnectionState::Reading,
            ConnectionState::Drained,
            ConnectionState::Idle,
        ]
    );
}

#[tokio::test]
async fn server_that_exits_immediately_keeps_being_replaced() {
    let mut conn = Connection::builder()
        .binary("sh")
        .subcommand("-c")
        .arg("exit 0")
        .timeout(TEST_TIMEOUT)
        .connect()
        .await
        .unwrap();

    let values = conn.ping(NO_ARGS).await.unwrap();
    assert!(values.is_empty());
    assert!(conn.restarts() >= 1);

    let values = conn.ping(NO_ARGS).await.unwrap();
    assert!(values.is_empty());
    assert!(conn.restarts() >= 2);
}

#[tokio::test]
async fn shutdown_reaps_without_restart() {
    let (mut conn, observer) = connect_recorded().await;
    conn.ping(NO_ARGS).await.unwrap();

    conn.shutdown().await.expect("shutdown should succeed");

    assert!(observer.restarts().is_empty());
    assert_eq!(observer.spawns.lock().unwrap().len(), 1);
    assert_eq!(
        observer.entered_states().last(),
        Some(&ConnectionState::Closing)
    );
}

#[tokio::test]
async fn sequential_requests_stay_in_sync() {
    let (mut conn, _observer) = connect_recorded().await;

    for _ in 0..3 {
        let values = conn.ping(NO_ARGS).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["pong"], "mu");
    }
    let values = conn.find([("query", "x")]).await.unwrap();
    assert_eq!(values.len(), 3);
}

#[tokio::test]
async fn missing_binary_fails_to_connect() {
    let result = Connection::builder()
        .binary("/nonexistent/bin/mu-does-not-exist")
        .connect()
        .await;

    assert!(matches!(result, Err(Error::BinaryNotFound { .. })));
}

#[tokio::test]
async fn invalid_timeout_argument_is_rejected() {
    let (mut conn, _observer) = connect_recorded().await;

    let result = conn.find([("timeout", "never"), ("query", "x")]).await;

    assert!(matches!(result, Err(Error::InvalidCommand(_))));
    assert_eq!(conn.timeout(), TEST_TIMEOUT);

    // The connection is still usable.
    let values = conn.ping(NO_ARGS).await.unwrap();
    assert_eq!(values.len(), 1);
}

#[tokio::test]
async fn shared_connection_behind_mutex() {
    let (conn, _observer) = connect_recorded().await;
    let conn = Arc::new(tokio::sync::Mutex::new(conn));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let conn = conn.clone();
        handles.push(tokio::spawn(async move {
            conn.lock().await.ping(NO_ARGS).await
        }));
    }
    for handle in handles {
        let values = handle.await.unwrap().unwrap();
        assert_eq!(values.len(), 1);
    }
}

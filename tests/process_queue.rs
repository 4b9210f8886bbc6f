#![cfg(unix)]

//! End-to-end runs against real `/bin/sh` workers.

use std::sync::Arc;
use std::time::Duration;

use actionvisor::{
    Bus, CommandSpawner, Config, ExecutionMode, ExecutionRequest, Hub, Response, SettleError,
    SingleShotSupervisor, Spawn, StreamingSupervisor, TaskLabel,
};
use tokio::sync::mpsc;

fn shell(script: &str) -> Arc<dyn Spawn> {
    Arc::new(
        CommandSpawner::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .with_exit_drain(Duration::from_millis(100)),
    )
}

fn label(id: &str) -> TaskLabel {
    TaskLabel::new(id, &ExecutionRequest::from("{}"))
}

#[tokio::test]
async fn single_shot_returns_the_first_message() {
    let sup = SingleShotSupervisor::new(
        shell(r#"read -r l; echo '"ok"'; sleep 5"#),
        Bus::new(64),
        Duration::from_secs(10),
    );
    let out = sup
        .execute(&label("execute-1"), &ExecutionRequest::from("{}"))
        .await;
    assert_eq!(out, Ok("ok".to_string()));
}

#[tokio::test]
async fn object_messages_are_returned_as_json_text() {
    let sup = SingleShotSupervisor::new(
        shell(r#"read -r l; echo '{"status":200}'"#),
        Bus::new(64),
        Duration::from_secs(10),
    );
    let out = sup
        .execute(&label("execute-2"), &ExecutionRequest::from("{}"))
        .await;
    assert_eq!(out, Ok(r#"{"status":200}"#.to_string()));
}

#[tokio::test]
async fn silent_exit_is_abnormal() {
    let sup = SingleShotSupervisor::new(
        shell("read -r l; exit 3"),
        Bus::new(64),
        Duration::from_secs(10),
    );
    let err = sup
        .execute(&label("execute-3"), &ExecutionRequest::from("{}"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, SettleError::AbnormalExit { .. }),
        "unexpected: {err:?}"
    );
}

#[tokio::test]
async fn hung_worker_is_killed_on_timeout() {
    let sup = SingleShotSupervisor::new(
        shell("exec sleep 30"),
        Bus::new(64),
        Duration::from_millis(300),
    );
    let started = tokio::time::Instant::now();
    let err = sup
        .execute(&label("execute-4"), &ExecutionRequest::from("{}"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn answer_arrives_while_a_large_request_is_unread() {
    // 512 KiB is far past the pipe buffer; the worker never reads stdin.
    let sup = SingleShotSupervisor::new(
        shell(r#"echo '"ok"'; exec sleep 30"#),
        Bus::new(64),
        Duration::from_secs(3),
    );
    let payload = "x".repeat(512 * 1024);
    let out = sup
        .execute(&label("execute-6"), &ExecutionRequest::from(payload))
        .await;
    assert_eq!(out, Ok("ok".to_string()));
}

#[tokio::test]
async fn large_request_reaches_a_reading_worker() {
    let sup = SingleShotSupervisor::new(
        shell(r#"read -r l; printf '"%s"\n' "${#l}""#),
        Bus::new(64),
        Duration::from_secs(10),
    );
    let payload = "y".repeat(256 * 1024);
    let out = sup
        .execute(&label("execute-7"), &ExecutionRequest::from(payload))
        .await;
    // The line is the JSON string, quotes included.
    assert_eq!(out, Ok((256 * 1024 + 2).to_string()));
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let sup = SingleShotSupervisor::new(
        Arc::new(CommandSpawner::new("/nonexistent/action-worker")),
        Bus::new(64),
        Duration::from_secs(1),
    );
    let err = sup
        .execute(&label("execute-5"), &ExecutionRequest::from("{}"))
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "settle_spawn_failed");
}

#[tokio::test]
async fn streaming_forwards_chunks_until_done() {
    let script = r#"read -r l; echo '"a"'; echo '"b"'; echo '"PROCESS FINISHED"'; sleep 5"#;
    let sup = StreamingSupervisor::new(
        shell(script),
        Bus::new(64),
        Duration::from_secs(10),
        "PROCESS FINISHED",
    );
    let (tx, mut rx) = mpsc::channel(16);
    let count = sup
        .execute(&label("extended-1"), &ExecutionRequest::from("{}"), &tx)
        .await;
    drop(tx);

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    assert_eq!(count, Ok(2));
    assert_eq!(chunks, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn hub_routes_to_real_workers() {
    let mut cfg = Config::default();
    cfg.worker.program = Some("/bin/sh".into());
    cfg.worker.args = vec![
        "-c".into(),
        r#"read -r l; echo '"one"'; echo '"PROCESS FINISHED"'"#.into(),
    ];
    let hub = Hub::builder(cfg).without_log_writer().build().unwrap();

    match hub.submit("{}", ExecutionMode::SingleShot).await.unwrap() {
        Response::Complete(out) => assert_eq!(out, "one"),
        other => panic!("unexpected response: {other:?}"),
    }
    match hub.submit("{}", ExecutionMode::Streaming).await.unwrap() {
        Response::Stream(stream) => {
            assert_eq!(stream.collect_all().await, Ok(vec!["one".to_string()]));
        }
        other => panic!("unexpected response: {other:?}"),
    }

    hub.shutdown().await.unwrap();
}

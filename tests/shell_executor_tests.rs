use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tonic::{Code, Status};

use task_agent::executor::{Executor, ShellExecutor, TaskContext};
use task_agent::proto::task_response::Content;
use task_agent::security::CommandValidator;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Out(String),
    Err(String),
}

/// Run a command through an executor the way the dispatcher does: a frame
/// channel, a deadline watchdog, and a collector on the receive side.
async fn run_with(
    executor: ShellExecutor,
    command: &str,
    timeout: Duration,
) -> (Vec<Line>, Result<(), Status>) {
    let ctx = TaskContext::new(timeout);
    let (frame_tx, mut frame_rx) = mpsc::channel::<task_agent::executor::Frame>(256);

    let watchdog = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(ctx.deadline()).await;
            ctx.cancel();
        })
    };

    let collector = tokio::spawn(async move {
        let mut lines = Vec::new();
        while let Some(frame) = frame_rx.recv().await {
            if let Ok(response) = frame {
                match response.content {
                    Some(Content::Output(line)) => lines.push(Line::Out(line)),
                    Some(Content::Error(line)) => lines.push(Line::Err(line)),
                    None => {}
                }
            }
        }
        lines
    });

    let result = executor.execute(&ctx, command, frame_tx).await;
    watchdog.abort();
    let lines = collector.await.unwrap();
    (lines, result)
}

async fn run_shell(command: &str, timeout: Duration) -> (Vec<Line>, Result<(), Status>) {
    run_with(ShellExecutor::unvalidated(), command, timeout).await
}

fn validating_executor(yaml: &str) -> (ShellExecutor, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shell-security.yaml");
    fs::write(&path, yaml).unwrap();
    let validator = Arc::new(CommandValidator::new(&path).unwrap());
    (ShellExecutor::new(validator), dir)
}

/// Poll until the process is gone; zombies linger briefly until reaped.
async fn assert_process_dies(pid: i32) {
    for _ in 0..40 {
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        if !alive {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("process {} still alive after kill", pid);
}

#[tokio::test]
async fn simple_command_streams_stdout() {
    let (lines, result) = run_shell("echo hello", Duration::from_secs(10)).await;
    assert!(result.is_ok(), "unexpected error: {:?}", result);
    assert_eq!(lines, vec![Line::Out("hello".into())]);
}

#[tokio::test]
async fn empty_command_is_invalid_argument() {
    let (lines, result) = run_shell("   ", Duration::from_secs(10)).await;
    let status = result.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "empty command");
    assert!(lines.is_empty());
}

#[tokio::test]
async fn stderr_lines_become_error_frames() {
    let (lines, result) = run_shell("echo oops 1>&2", Duration::from_secs(10)).await;
    assert!(result.is_ok(), "unexpected error: {:?}", result);
    assert_eq!(lines, vec![Line::Err("oops".into())]);
}

#[tokio::test]
async fn stdout_order_is_preserved() {
    let (lines, result) = run_shell(
        "for i in 1 2 3 4 5; do echo $i; done",
        Duration::from_secs(10),
    )
    .await;
    assert!(result.is_ok(), "unexpected error: {:?}", result);
    let expected: Vec<Line> = (1..=5).map(|i| Line::Out(i.to_string())).collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn per_stream_order_survives_interleaving() {
    let (lines, result) = run_shell(
        "for i in 1 2 3; do echo out$i; echo err$i 1>&2; done",
        Duration::from_secs(10),
    )
    .await;
    assert!(result.is_ok(), "unexpected error: {:?}", result);

    let outs: Vec<&Line> = lines.iter().filter(|l| matches!(l, Line::Out(_))).collect();
    let errs: Vec<&Line> = lines.iter().filter(|l| matches!(l, Line::Err(_))).collect();
    assert_eq!(
        outs,
        vec![
            &Line::Out("out1".into()),
            &Line::Out("out2".into()),
            &Line::Out("out3".into())
        ]
    );
    assert_eq!(
        errs,
        vec![
            &Line::Err("err1".into()),
            &Line::Err("err2".into()),
            &Line::Err("err3".into())
        ]
    );
}

#[tokio::test]
async fn nonzero_exit_is_internal_error() {
    let (lines, result) = run_shell("exit 3", Duration::from_secs(10)).await;
    let status = result.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("command exited with error"));
    assert!(lines.is_empty());
}

#[tokio::test]
async fn unknown_command_reports_stderr_and_fails() {
    let (lines, result) =
        run_shell("definitely_not_a_command_xyz", Duration::from_secs(10)).await;
    assert!(result.is_err());
    assert!(lines.iter().any(|l| matches!(l, Line::Err(_))));
}

#[tokio::test]
async fn timeout_kills_the_whole_process_group() {
    let start = Instant::now();
    // The backgrounded sleep lives in the same process group as bash; its
    // pid is echoed so the test can probe for survivors.
    let (lines, result) = run_shell("sleep 30 & echo $!; wait $!", Duration::from_secs(1)).await;
    let elapsed = start.elapsed();

    let status = result.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(
        status
            .message()
            .contains("command canceled or timeout: deadline exceeded"),
        "unexpected message: {}",
        status.message()
    );
    assert!(elapsed < Duration::from_secs(3), "kill took {:?}", elapsed);

    let Some(Line::Out(pid_line)) = lines.first() else {
        panic!("expected the sleep pid as the first frame, got {:?}", lines);
    };
    let pid: i32 = pid_line.trim().parse().expect("pid line");
    assert_process_dies(pid).await;
}

#[tokio::test]
async fn explicit_cancellation_reports_canceled() {
    let ctx = TaskContext::new(Duration::from_secs(30));
    let (frame_tx, _frame_rx) = mpsc::channel(16);

    let canceller = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ctx.cancel();
        })
    };

    let result = ShellExecutor::unvalidated()
        .execute(&ctx, "sleep 30", frame_tx)
        .await;
    canceller.await.unwrap();

    let status = result.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status
        .message()
        .contains("command canceled or timeout: canceled"));
}

#[tokio::test]
async fn denied_command_never_spawns() {
    let (executor, dir) = validating_executor(
        "\
security:
  enableValidation: true
  defaultPolicy: allow
  commandParsing:
    allowPipes: false
    allowRedirection: false
    allowChaining: false
",
    );

    let marker = dir.path().join("ran");
    let command = format!("touch {}; echo done", marker.display());
    let (lines, result) = run_with(executor, &command, Duration::from_secs(10)).await;

    let status = result.unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
    assert!(status
        .message()
        .contains("command not allowed: command chaining not allowed"));
    assert!(lines.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!marker.exists(), "denied command was executed");
}

#[tokio::test]
async fn allowed_command_runs_normalized() {
    let (executor, _dir) = validating_executor(
        "\
security:
  enableValidation: true
  defaultPolicy: allow
  commandParsing:
    allowPipes: true
    allowRedirection: true
    allowChaining: true
",
    );

    let (lines, result) = run_with(executor, "   echo hi   ", Duration::from_secs(10)).await;
    assert!(result.is_ok(), "unexpected error: {:?}", result);
    assert_eq!(lines, vec![Line::Out("hi".into())]);
}

#[tokio::test]
async fn large_output_is_delivered_in_order() {
    // 1500 lines exceeds the internal channel capacity, exercising the
    // reader/sender backpressure path.
    let (lines, result) = run_shell("seq 1 1500", Duration::from_secs(30)).await;
    assert!(result.is_ok(), "unexpected error: {:?}", result);
    assert_eq!(lines.len(), 1500);
    let expected: Vec<Line> = (1..=1500).map(|i| Line::Out(i.to_string())).collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn send_failure_tears_the_task_down() {
    let ctx = TaskContext::new(Duration::from_secs(30));
    let (frame_tx, frame_rx) = mpsc::channel(8);
    // The caller is gone before the first frame.
    drop(frame_rx);

    let start = Instant::now();
    let result = ShellExecutor::unvalidated()
        .execute(&ctx, "echo a; sleep 30", frame_tx)
        .await;
    let elapsed = start.elapsed();

    let status = result.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(
        status.message().contains("failed to send output"),
        "unexpected message: {}",
        status.message()
    );
    assert!(elapsed < Duration::from_secs(10), "teardown took {:?}", elapsed);
}

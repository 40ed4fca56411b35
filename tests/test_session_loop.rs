#![cfg(unix)]

//! End-to-end tests for the authorization loop and the one-shot query,
//! driven against a fake `claude` CLI shell script.

use futures::StreamExt;
use mini_agent::{
    AgentClient, AgentOptions, ContentBlock, Message, PreToolUseHook, SessionState, query,
    run_session,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

struct TempTestDir {
    path: PathBuf,
}

impl TempTestDir {
    fn new(prefix: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX_EPOCH")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
        fs::create_dir_all(&path).expect("failed to create temp directory");
        Self { path }
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    fn write_executable_script(&self, name: &str, content: &str) -> PathBuf {
        let path = self.join(name);
        fs::write(&path, content).expect("failed to write script");
        let mut perms = fs::metadata(&path)
            .expect("failed to stat script")
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("failed to chmod script");
        path
    }
}

impl Drop for TempTestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

async fn wait_for_pid_exit(pid: i32, timeout: Duration) {
    let start = Instant::now();
    loop {
        if !Path::new(&format!("/proc/{pid}")).exists() {
            return;
        }
        assert!(
            start.elapsed() < timeout,
            "process {pid} still alive after {:?}",
            timeout
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Fake claude CLI speaking just enough of the stream-json protocol:
/// - answers the initialize handshake;
/// - a prompt containing `use-tool` produces a Write tool call followed by
///   an error tool-result, then waits for the interrupt;
/// - a prompt containing `check-hook` issues a PreToolUse hook_callback and
///   records the decision it gets back in MARKER_FILE;
/// - any other prompt gets a plain text reply.
fn build_fake_claude_cli_script() -> &'static str {
    r#"#!/usr/bin/env bash
set -euo pipefail

if [[ -n "${PID_FILE:-}" ]]; then
  echo $$ > "$PID_FILE"
fi

emit_result() {
  echo '{"type":"result","subtype":"success","duration_ms":1,"duration_api_ms":1,"is_error":false,"num_turns":1,"session_id":"fake"}'
}

while IFS= read -r line; do
  case "$line" in
    *'"subtype":"initialize"'*)
      rid="$(printf '%s' "$line" | sed -n 's/.*"request_id":"\([^"]*\)".*/\1/p')"
      echo "{\"type\":\"control_response\",\"response\":{\"subtype\":\"success\",\"request_id\":\"$rid\",\"response\":{}}}"
      ;;
    *'"subtype":"interrupt"'*)
      rid="$(printf '%s' "$line" | sed -n 's/.*"request_id":"\([^"]*\)".*/\1/p')"
      echo "{\"type\":\"control_response\",\"response\":{\"subtype\":\"success\",\"request_id\":\"$rid\",\"response\":{}}}"
      emit_result
      ;;
    *'"permissionDecision":"allow"'*)
      if [[ -n "${MARKER_FILE:-}" ]]; then
        echo "allow" >> "$MARKER_FILE"
      fi
      echo '{"type":"assistant","message":{"content":[{"type":"text","text":"hook allowed"}],"model":"fake-model"}}'
      emit_result
      ;;
    *'"type":"control_response"'*)
      if [[ -n "${MARKER_FILE:-}" ]]; then
        echo "no-opinion" >> "$MARKER_FILE"
      fi
      echo '{"type":"assistant","message":{"content":[{"type":"text","text":"hook deferred"}],"model":"fake-model"}}'
      emit_result
      ;;
    *'use-tool'*)
      echo '{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_1","name":"Write","input":{}}],"model":"fake-model"}}'
      echo '{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_1","is_error":true}]}}'
      ;;
    *'check-hook'*)
      echo '{"type":"control_request","request_id":"srv_1","request":{"subtype":"hook_callback","callback_id":"hook_0","input":{"tool_name":"Write","tool_input":{}},"tool_use_id":"toolu_9"}}'
      ;;
    *'"type":"user"'*)
      echo '{"type":"assistant","message":{"content":[{"type":"text","text":"ok"}],"model":"fake-model"}}'
      emit_result
      ;;
  esac
done
"#
}

fn allow_set_hook(state: &SessionState) -> PreToolUseHook {
    let allow_set = state.allow_set();
    Arc::new(move |input| {
        let allow_set = allow_set.clone();
        Box::pin(async move { allow_set.decide(&input.tool_name) })
    })
}

#[tokio::test]
async fn session_loop_authorizes_denied_tool_and_hook_replays_it() {
    let temp = TempTestDir::new("mini-agent-loop");
    let cli_path = temp.write_executable_script("claude", build_fake_claude_cli_script());
    let marker = temp.join("hook.marker");
    let pid_file = temp.join("claude.pid");

    let mut state = SessionState::new();
    let options = AgentOptions::builder()
        .cli_path(&cli_path)
        .env("PID_FILE", pid_file.to_string_lossy())
        .env("MARKER_FILE", marker.to_string_lossy())
        .pre_tool_use(allow_set_hook(&state))
        .build();

    let mut client = AgentClient::new(options);
    client.connect().await.expect("connect should succeed");

    // Turn 1 triggers a denied tool call; `allow` authorizes it; turn 3 makes
    // the CLI consult the hook, which now answers "allow".
    let input: &[u8] = b"use-tool\nallow\ncheck-hook\nexit\n";
    tokio::time::timeout(
        Duration::from_secs(10),
        run_session(&client, &mut state, input),
    )
    .await
    .expect("session timed out")
    .expect("session should succeed");

    assert!(state.ended());
    assert_eq!(state.pending_tool(), None);
    assert!(state.allow_set().contains("Write"));

    let marker_content = fs::read_to_string(&marker).expect("hook was never consulted");
    assert!(
        marker_content.contains("allow"),
        "hook should have allowed the authorized tool, got: {marker_content}"
    );

    let pid: i32 = fs::read_to_string(&pid_file)
        .expect("pid file missing")
        .trim()
        .parse()
        .expect("pid file should contain a pid");
    client
        .disconnect()
        .await
        .expect("disconnect should succeed");
    wait_for_pid_exit(pid, Duration::from_secs(2)).await;
}

#[tokio::test]
async fn hook_defers_before_any_authorization() {
    let temp = TempTestDir::new("mini-agent-defer");
    let cli_path = temp.write_executable_script("claude", build_fake_claude_cli_script());
    let marker = temp.join("hook.marker");

    let mut state = SessionState::new();
    let options = AgentOptions::builder()
        .cli_path(&cli_path)
        .env("MARKER_FILE", marker.to_string_lossy())
        .pre_tool_use(allow_set_hook(&state))
        .build();

    let mut client = AgentClient::new(options);
    client.connect().await.expect("connect should succeed");

    let input: &[u8] = b"check-hook\nexit\n";
    tokio::time::timeout(
        Duration::from_secs(10),
        run_session(&client, &mut state, input),
    )
    .await
    .expect("session timed out")
    .expect("session should succeed");

    let marker_content = fs::read_to_string(&marker).expect("hook was never consulted");
    assert!(
        marker_content.contains("no-opinion"),
        "hook should defer for an unauthorized tool, got: {marker_content}"
    );

    client
        .disconnect()
        .await
        .expect("disconnect should succeed");
}

#[tokio::test]
async fn exit_as_first_input_sends_no_prompts() {
    let temp = TempTestDir::new("mini-agent-exit");
    let cli_path = temp.write_executable_script("claude", build_fake_claude_cli_script());
    let marker = temp.join("hook.marker");

    let mut state = SessionState::new();
    let options = AgentOptions::builder()
        .cli_path(&cli_path)
        .env("MARKER_FILE", marker.to_string_lossy())
        .build();

    let mut client = AgentClient::new(options);
    client.connect().await.expect("connect should succeed");

    let input: &[u8] = b"exit\n";
    tokio::time::timeout(
        Duration::from_secs(10),
        run_session(&client, &mut state, input),
    )
    .await
    .expect("session timed out")
    .expect("session should succeed");

    assert!(state.ended());
    assert!(!marker.exists(), "no turn should have run");

    client
        .disconnect()
        .await
        .expect("disconnect should succeed");
}

#[tokio::test]
async fn one_shot_query_streams_until_result() {
    let temp = TempTestDir::new("mini-agent-oneshot");
    let cli_path = temp.write_executable_script("claude", build_fake_claude_cli_script());

    let options = AgentOptions::builder().cli_path(&cli_path).build();

    let stream = query("hello there", options);
    tokio::pin!(stream);

    let mut saw_text = false;
    let mut saw_result = false;
    while let Some(item) = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for message")
    {
        match item.expect("message should be Ok") {
            Message::Assistant(a) => {
                if let Some(ContentBlock::Text(t)) = a.content.first() {
                    assert_eq!(t.text, "ok");
                    saw_text = true;
                }
            }
            Message::Result(r) => {
                assert!(!r.is_error);
                saw_result = true;
            }
            _ => {}
        }
    }

    assert!(saw_text, "did not receive assistant reply");
    assert!(saw_result, "did not receive result message");
}

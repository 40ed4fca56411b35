//! Interactive mini agent loop with runtime tool authorization.
//!
//! Run with: cargo run --bin mini-agent
//!
//! Tools start out denied by the CLI's default policy. When the agent's tool
//! call fails, the loop interrupts the turn and asks you to type `allow`;
//! the PreToolUse hook then permits that tool for the rest of the session.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::BufReader;

use mini_agent::{
    AgentClient, AgentOptions, PreToolUseHook, SessionState, logging, run_session, workspace,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logging::init("output", "mini_agent.log")?;

    // Restore the fixture to its broken state before every run.
    workspace::reset("./workspace")?;

    let mut state = SessionState::new();
    let allow_set = state.allow_set();
    let hook: PreToolUseHook = Arc::new(move |input| {
        let allow_set = allow_set.clone();
        Box::pin(async move { allow_set.decide(&input.tool_name) })
    });

    let options = AgentOptions::builder()
        .system_prompt_preset("claude_code")
        .cwd("./workspace")
        .allowed_tools(["Read", "Write"])
        .pre_tool_use(hook)
        .build();

    let mut client = AgentClient::new(options);
    client.connect().await?;

    // The CLI process must be released on every exit path.
    let outcome = run_session(&client, &mut state, BufReader::new(tokio::io::stdin())).await;
    client.disconnect().await?;
    outcome?;

    Ok(())
}

//! One-shot demo: hand the agent a broken script and log everything it does.
//!
//! Run with: cargo run --bin fix-script

use anyhow::Result;
use futures::StreamExt;
use mini_agent::{AgentOptions, logging, query, render, workspace};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logging::init("output", "fix_script.log")?;

    // Restore the fixture to its broken state before every run.
    workspace::reset("./workspace")?;

    let options = AgentOptions::builder()
        .system_prompt("You are a master of brevity. Answer as tersely as possible.")
        .cwd("./workspace")
        .allowed_tools(["Read", "Write", "Edit"])
        .build();

    // One query is one full agent turn: text generation and tool calls run
    // to completion with no way to intervene in between.
    let stream = query("Nothing is printed when I run hello.js", options);
    tokio::pin!(stream);
    while let Some(message) = stream.next().await {
        tracing::info!("{}", render(&message?));
    }

    Ok(())
}

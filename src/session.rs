//! Interactive tool-authorization loop.
//!
//! A console-driven session in which the agent's tool calls start out denied
//! by the CLI's default policy. When a denied call surfaces as an error
//! tool-result, the loop interrupts the turn and asks the human to authorize
//! that tool; once authorized, the PreToolUse hook answers "allow" for it for
//! the rest of the session.

use std::collections::{HashMap, HashSet};
use std::io::Write as _;
use std::sync::{Arc, RwLock};

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::client::AgentClient;
use crate::error::Result;
use crate::format::render;
use crate::hooks::HookDecision;
use crate::types::{ContentBlock, Message, UserContent};

/// Console token that ends the session.
pub const EXIT_COMMAND: &str = "exit";
/// Console token that authorizes the pending tool.
pub const ALLOW_COMMAND: &str = "allow";
/// Prompt sent in place of the allow token once a tool has been authorized.
pub const CONTINUE_PROMPT: &str = "Authorization granted, please continue";

const INPUT_PROMPT: &str = "prompt (exit to quit; allow to authorize): ";

/// Shared, read-only view of the tools the human has authorized.
///
/// The hook holds a clone of this handle; insertion happens only through
/// [`SessionState::handle_input`] on explicit confirmation, so the set grows
/// monotonically within a session.
#[derive(Clone, Default)]
pub struct AllowSet {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl AllowSet {
    pub fn contains(&self, tool_name: &str) -> bool {
        self.inner
            .read()
            .expect("allow set lock poisoned")
            .contains(tool_name)
    }

    /// Permission decision for a tool call: allow if previously authorized,
    /// otherwise defer to the runtime's default policy.
    pub fn decide(&self, tool_name: &str) -> HookDecision {
        if self.contains(tool_name) {
            HookDecision::Allow {
                reason: "user allowed".to_string(),
            }
        } else {
            HookDecision::NoOpinion
        }
    }

    fn insert(&self, tool_name: String) {
        self.inner
            .write()
            .expect("allow set lock poisoned")
            .insert(tool_name);
    }
}

/// What to do with a line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// End the session without sending anything.
    Exit,
    /// Forward this prompt to the agent.
    Send(String),
}

/// Reaction to a single observed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAction {
    Continue,
    /// A denied tool call was detected; abort the rest of the turn.
    Interrupt,
}

/// State owned by the authorization loop.
///
/// `tool_calls` maps every observed tool-call id to its tool name and is
/// never pruned. `pending` is a single slot: a newer denied call overwrites
/// an unresolved older one.
pub struct SessionState {
    allow_set: AllowSet,
    tool_calls: HashMap<String, String>,
    pending: Option<String>,
    ended: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            allow_set: AllowSet::default(),
            tool_calls: HashMap::new(),
            pending: None,
            ended: false,
        }
    }

    /// Handle for the PreToolUse hook.
    pub fn allow_set(&self) -> AllowSet {
        self.allow_set.clone()
    }

    pub fn pending_tool(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Classify one line of console input.
    ///
    /// `allow` is only special while an authorization is pending; otherwise
    /// it is forwarded verbatim like any other text.
    pub fn handle_input(&mut self, line: &str) -> InputAction {
        if line == EXIT_COMMAND {
            self.ended = true;
            return InputAction::Exit;
        }
        if line == ALLOW_COMMAND {
            if let Some(tool) = self.pending.take() {
                tracing::info!("tool [{}] authorized for this session", tool);
                self.allow_set.insert(tool);
                return InputAction::Send(CONTINUE_PROMPT.to_string());
            }
        }
        InputAction::Send(line.to_string())
    }

    /// Track tool calls and detect denied ones.
    pub fn observe(&mut self, message: &Message) -> TurnAction {
        match message {
            Message::Assistant(assistant) => {
                if let Some(ContentBlock::ToolUse(tool_use)) = assistant.content.first() {
                    self.tool_calls
                        .insert(tool_use.id.clone(), tool_use.name.clone());
                }
                TurnAction::Continue
            }
            Message::User(user) => {
                let UserContent::Blocks(blocks) = &user.content else {
                    return TurnAction::Continue;
                };
                let Some(ContentBlock::ToolResult(result)) = blocks.first() else {
                    return TurnAction::Continue;
                };
                if result.is_error != Some(true) {
                    return TurnAction::Continue;
                }
                match self.tool_calls.get(&result.tool_use_id) {
                    Some(tool_name) => {
                        self.pending = Some(tool_name.clone());
                        tracing::info!(
                            "tool [{}] was denied; type `{}` to authorize it",
                            tool_name,
                            ALLOW_COMMAND
                        );
                        TurnAction::Interrupt
                    }
                    None => {
                        // Preserved gap: no authorization prompt for results
                        // whose call id was never recorded.
                        tracing::debug!(
                            tool_use_id = %result.tool_use_id,
                            "error tool result for unknown call id"
                        );
                        TurnAction::Continue
                    }
                }
            }
            Message::System(_) | Message::Result(_) | Message::StreamEvent(_) => {
                TurnAction::Continue
            }
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the authorization loop until the exit command or end of input.
///
/// One iteration per turn: read a line, classify it, send the (possibly
/// substituted) prompt, and drain the turn's message stream, logging every
/// message and interrupting when a denied tool call is observed. The
/// interrupt is best-effort; the rest of the turn is still drained so the
/// next prompt starts from a quiet stream.
pub async fn run_session<R>(
    client: &AgentClient,
    state: &mut SessionState,
    input: R,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while !state.ended() {
        print!("{INPUT_PROMPT}");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = match state.handle_input(line.trim()) {
            InputAction::Exit => break,
            InputAction::Send(prompt) => prompt,
        };

        // Subscribe before sending so no message of the turn is missed.
        let mut response = client.receive_response();
        client.query(&prompt).await?;

        while let Some(message) = response.next().await {
            let message = message?;
            tracing::info!("{}", render(&message));

            if state.observe(&message) == TurnAction::Interrupt {
                client.interrupt().await?;
            }
        }
    }

    Ok(())
}

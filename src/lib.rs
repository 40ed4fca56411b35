//! mini-agent
//!
//! A small interactive harness over the Claude Code CLI: a one-shot
//! "diagnose this broken script" demo and a console loop in which a human
//! grants per-tool authorization at runtime through a PreToolUse hook.
//!
//! The [`client`] and [`transport`] modules carry the minimum plumbing
//! needed to drive the CLI's `stream-json` protocol; [`session`] holds the
//! authorization loop itself.

pub mod client;
pub mod error;
pub mod format;
pub mod hooks;
pub mod logging;
pub mod message_parser;
pub mod options;
pub mod session;
pub mod transport;
pub mod types;
pub mod workspace;

// Primary exports
pub use client::{AgentClient, query};
pub use error::{Error, Result};
pub use format::render;
pub use hooks::{HookDecision, PreToolUseHook, PreToolUseInput};
pub use message_parser::parse_message;
pub use options::{AgentOptions, AgentOptionsBuilder, PermissionMode, SystemPromptConfig};
pub use session::{AllowSet, InputAction, SessionState, TurnAction, run_session};
pub use types::*;

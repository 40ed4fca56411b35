//! PreToolUse permission hook.
//!
//! The CLI consults registered hooks before executing a tool. A hook either
//! allows the call with a reason or states no opinion, deferring to the CLI's
//! own permission policy (which may deny the call and surface an error
//! tool-result instead).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Decision returned by a [`PreToolUseHook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    /// Permit the tool call, with a reason the CLI records.
    Allow { reason: String },
    /// Defer to the CLI's default permission policy.
    NoOpinion,
}

impl HookDecision {
    /// Wire encoding for the `hook_callback` control response.
    ///
    /// `NoOpinion` serializes to an empty object, which the CLI treats as
    /// "no hook-specific output".
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Allow { reason } => serde_json::json!({
                "hookSpecificOutput": {
                    "hookEventName": "PreToolUse",
                    "permissionDecision": "allow",
                    "permissionDecisionReason": reason,
                }
            }),
            Self::NoOpinion => serde_json::json!({}),
        }
    }
}

/// Input passed to a [`PreToolUseHook`].
#[derive(Debug, Clone)]
pub struct PreToolUseInput {
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub tool_use_id: Option<String>,
}

impl PreToolUseInput {
    /// Extract the hook input from a `hook_callback` control request payload.
    pub(crate) fn from_wire(input: &serde_json::Value, tool_use_id: Option<String>) -> Self {
        Self {
            tool_name: input
                .get("tool_name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            tool_input: input
                .get("tool_input")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            tool_use_id,
        }
    }
}

/// Async callback invoked before each tool execution.
pub type PreToolUseHook = Arc<
    dyn Fn(PreToolUseInput) -> Pin<Box<dyn Future<Output = HookDecision> + Send>> + Send + Sync,
>;

/// Hook registration block for the `initialize` control request.
///
/// A single callback id is advertised; the client routes every PreToolUse
/// `hook_callback` request to the registered hook.
pub(crate) fn initialize_config(has_hook: bool) -> serde_json::Value {
    if !has_hook {
        return serde_json::Value::Null;
    }
    serde_json::json!({
        "PreToolUse": [{
            "matcher": serde_json::Value::Null,
            "hookCallbackIds": ["hook_0"],
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_decision_carries_reason_on_the_wire() {
        let wire = HookDecision::Allow {
            reason: "user allowed".to_string(),
        }
        .to_wire();
        let out = &wire["hookSpecificOutput"];
        assert_eq!(out["hookEventName"], "PreToolUse");
        assert_eq!(out["permissionDecision"], "allow");
        assert_eq!(out["permissionDecisionReason"], "user allowed");
    }

    #[test]
    fn no_opinion_is_an_empty_object() {
        let wire = HookDecision::NoOpinion.to_wire();
        assert_eq!(wire, serde_json::json!({}));
    }

    #[test]
    fn hook_input_parses_wire_payload() {
        let input = PreToolUseInput::from_wire(
            &serde_json::json!({
                "tool_name": "Write",
                "tool_input": {"file_path": "hello.js"}
            }),
            Some("toolu_1".to_string()),
        );
        assert_eq!(input.tool_name, "Write");
        assert_eq!(input.tool_input["file_path"], "hello.js");
        assert_eq!(input.tool_use_id.as_deref(), Some("toolu_1"));
    }
}

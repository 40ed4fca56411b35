//! Agent options and builder.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::hooks::PreToolUseHook;

/// Permission modes for tool execution control.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::AcceptEdits => write!(f, "acceptEdits"),
            Self::Plan => write!(f, "plan"),
            Self::BypassPermissions => write!(f, "bypassPermissions"),
        }
    }
}

impl From<&str> for PermissionMode {
    fn from(s: &str) -> Self {
        match s {
            "acceptEdits" => Self::AcceptEdits,
            "plan" => Self::Plan,
            "bypassPermissions" => Self::BypassPermissions,
            _ => Self::Default,
        }
    }
}

/// System prompt: a literal string, or one of the CLI's built-in presets with
/// an optional appended suffix.
#[derive(Debug, Clone)]
pub enum SystemPromptConfig {
    String(String),
    Preset {
        preset: String,
        append: Option<String>,
    },
}

/// Callback for stderr output from the CLI. Receives each line.
pub type StderrCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration for an agent session.
#[derive(Clone, Default)]
pub struct AgentOptions {
    pub system_prompt: Option<SystemPromptConfig>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub permission_mode: Option<PermissionMode>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub cwd: Option<PathBuf>,
    pub cli_path: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub include_partial_messages: bool,
    pub max_buffer_size: Option<usize>,
    pub pre_tool_use: Option<PreToolUseHook>,
    pub stderr: Option<StderrCallback>,
}

impl fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentOptions")
            .field("system_prompt", &self.system_prompt)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("permission_mode", &self.permission_mode)
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .field("cwd", &self.cwd)
            .field(
                "pre_tool_use",
                &self.pre_tool_use.as_ref().map(|_| "<callback>"),
            )
            .field("stderr", &self.stderr.as_ref().map(|_| "<callback>"))
            .finish_non_exhaustive()
    }
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::new()
    }
}

/// Builder for [`AgentOptions`].
pub struct AgentOptionsBuilder {
    options: AgentOptions,
}

impl AgentOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: AgentOptions::default(),
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(SystemPromptConfig::String(prompt.into()));
        self
    }

    /// Use one of the CLI's built-in system prompt presets.
    pub fn system_prompt_preset(mut self, preset: impl Into<String>) -> Self {
        self.options.system_prompt = Some(SystemPromptConfig::Preset {
            preset: preset.into(),
            append: None,
        });
        self
    }

    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn disallowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options.disallowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn permission_mode(mut self, mode: impl Into<PermissionMode>) -> Self {
        self.options.permission_mode = Some(mode.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    pub fn max_turns(mut self, turns: u32) -> Self {
        self.options.max_turns = Some(turns);
        self
    }

    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(path.into());
        self
    }

    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cli_path = Some(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    pub fn include_partial_messages(mut self, include: bool) -> Self {
        self.options.include_partial_messages = include;
        self
    }

    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.options.max_buffer_size = Some(size);
        self
    }

    /// Register the PreToolUse permission hook invoked before each tool call.
    pub fn pre_tool_use(mut self, hook: PreToolUseHook) -> Self {
        self.options.pre_tool_use = Some(hook);
        self
    }

    pub fn stderr(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.options.stderr = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> AgentOptions {
        self.options
    }
}

impl Default for AgentOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

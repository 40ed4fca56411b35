//! Subprocess transport using the Claude Code CLI.

use crate::error::{Error, Result};
use crate::options::{AgentOptions, SystemPromptConfig};
use crate::transport::Transport;
use async_stream::stream;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024; // 1MB

pub struct SubprocessCliTransport {
    options: AgentOptions,
    cli_path: String,
    cwd: Option<String>,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    ready: bool,
    max_buffer_size: usize,
}

impl SubprocessCliTransport {
    pub fn new(options: AgentOptions) -> Result<Self> {
        let cli_path = Self::find_cli(&options)?;
        let cwd = options
            .cwd
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());

        let max_buffer_size = options.max_buffer_size.unwrap_or(DEFAULT_MAX_BUFFER_SIZE);

        Ok(Self {
            options,
            cli_path,
            cwd,
            process: None,
            stdin: None,
            stdout: None,
            ready: false,
            max_buffer_size,
        })
    }

    fn find_cli(options: &AgentOptions) -> Result<String> {
        if let Some(ref p) = options.cli_path {
            return Ok(p.to_string_lossy().to_string());
        }

        if let Some(path) = which_cli() {
            return Ok(path);
        }

        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let locations = [
            format!("{}/.npm-global/bin/claude", home),
            "/usr/local/bin/claude".to_string(),
            format!("{}/.local/bin/claude", home),
            format!("{}/node_modules/.bin/claude", home),
            format!("{}/.yarn/bin/claude", home),
            format!("{}/.claude/local/claude", home),
        ];

        for path in &locations {
            if Path::new(path).exists() {
                return Ok(path.clone());
            }
        }

        Err(Error::CliNotFound(
            "Claude Code not found. Install with:\n  npm install -g @anthropic-ai/claude-code\n\n\
             Or provide the path via AgentOptions::cli_path()"
                .to_string(),
        ))
    }

    fn build_command(&self) -> Vec<String> {
        let mut cmd = vec![
            self.cli_path.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];

        match &self.options.system_prompt {
            None => {}
            Some(SystemPromptConfig::String(s)) => {
                cmd.push("--system-prompt".to_string());
                cmd.push(s.clone());
            }
            Some(SystemPromptConfig::Preset { append, .. }) => {
                if let Some(a) = append {
                    cmd.push("--append-system-prompt".to_string());
                    cmd.push(a.clone());
                }
            }
        }

        if !self.options.allowed_tools.is_empty() {
            cmd.push("--allowedTools".to_string());
            cmd.push(self.options.allowed_tools.join(","));
        }
        if !self.options.disallowed_tools.is_empty() {
            cmd.push("--disallowedTools".to_string());
            cmd.push(self.options.disallowed_tools.join(","));
        }
        if let Some(t) = self.options.max_turns {
            cmd.push("--max-turns".to_string());
            cmd.push(t.to_string());
        }
        if let Some(ref m) = self.options.model {
            cmd.push("--model".to_string());
            cmd.push(m.clone());
        }
        if let Some(ref m) = self.options.permission_mode {
            cmd.push("--permission-mode".to_string());
            cmd.push(m.to_string());
        }
        if self.options.include_partial_messages {
            cmd.push("--include-partial-messages".to_string());
        }

        cmd.push("--input-format".to_string());
        cmd.push("stream-json".to_string());

        cmd
    }
}

#[async_trait::async_trait]
impl Transport for SubprocessCliTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }

        let cmd = self.build_command();
        let cmd0 = cmd[0].clone();
        let cmd_rest: Vec<String> = cmd[1..].to_vec();

        let should_pipe_stderr = self.options.stderr.is_some();
        let stderr_dest = if should_pipe_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child_cmd = Command::new(cmd0);
        child_cmd
            .args(&cmd_rest)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr_dest)
            .env("CLAUDE_CODE_ENTRYPOINT", "mini-agent");

        for (k, v) in &self.options.env {
            child_cmd.env(k, v);
        }
        if let Some(ref cwd) = self.cwd {
            child_cmd.env("PWD", cwd);
            child_cmd.current_dir(cwd);
        }

        let mut process = child_cmd.spawn().map_err(|e| {
            if let Some(ref cwd) = self.cwd {
                if !Path::new(cwd).exists() {
                    return Error::Other(format!("Working directory does not exist: {}", cwd));
                }
            }
            Error::CliNotFound(format!(
                "Claude Code not found at: {} - {}",
                self.cli_path, e
            ))
        })?;

        self.stdin = process.stdin.take();
        self.stdout = process.stdout.take();

        if should_pipe_stderr {
            if let Some(stderr) = process.stderr.take() {
                let stderr_callback = self.options.stderr.clone();
                let stderr_reader = BufReader::new(stderr);
                tokio::spawn(async move {
                    let mut lines = stderr_reader.lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let line_str = line.trim_end();
                        if !line_str.is_empty() {
                            if let Some(ref cb) = stderr_callback {
                                cb(line_str);
                            }
                        }
                    }
                });
            }
        }

        self.process = Some(process);
        self.ready = true;

        Ok(())
    }

    async fn write(&mut self, data: &str) -> Result<()> {
        if !self.ready {
            return Err(Error::Other("Transport not ready for writing".to_string()));
        }
        if let Some(ref mut stdin) = self.stdin {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(data.as_bytes()).await?;
            stdin.flush().await?;
            Ok(())
        } else {
            Err(Error::Other("Stdin not available".to_string()))
        }
    }

    fn read_messages(
        &mut self,
    ) -> std::pin::Pin<Box<dyn futures::Stream<Item = Result<serde_json::Value>> + Send>> {
        let stdout = self.stdout.take();
        let max_buffer_size = self.max_buffer_size;

        let stream = stream! {
            let stdout = match stdout {
                Some(s) => s,
                None => {
                    yield Err(Error::Other("Not connected".to_string()));
                    return;
                }
            };

            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            let mut json_buffer = String::new();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        json_buffer.push_str(line);

                        if json_buffer.len() > max_buffer_size {
                            json_buffer.clear();
                            yield Err(Error::Other(format!(
                                "JSON message exceeded maximum buffer size of {} bytes",
                                max_buffer_size
                            )));
                            return;
                        }

                        match serde_json::from_str(&json_buffer) {
                            Ok(data) => {
                                json_buffer.clear();
                                yield Ok(data);
                            }
                            Err(_) => continue,
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(Error::Connection(e));
                        break;
                    }
                }
            }
        };

        Box::pin(stream)
    }

    async fn close(&mut self) -> Result<()> {
        self.ready = false;
        self.stdin = None;
        self.stdout = None;
        if let Some(mut process) = self.process.take() {
            let _ = process.kill().await;
            let _ = process.wait().await;
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn end_input(&mut self) -> Result<()> {
        if let Some(stdin) = self.stdin.take() {
            drop(stdin);
        }
        Ok(())
    }
}

fn which_cli() -> Option<String> {
    std::env::var_os("PATH").and_then(|paths| {
        for path in std::env::split_paths(&paths) {
            let full = path.join(if cfg!(target_os = "windows") {
                "claude.exe"
            } else {
                "claude"
            });
            if full.is_file() {
                return Some(full.to_string_lossy().to_string());
            }
        }
        None
    })
}

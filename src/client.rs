//! `AgentClient` - bidirectional streaming client for the Claude CLI.
//!
//! Wraps a [`SubprocessCliTransport`] with the CLI's control protocol:
//! the `initialize` handshake (advertising the PreToolUse hook), incoming
//! `hook_callback` requests, and outgoing control requests such as
//! `interrupt`.

use crate::error::{Error, Result};
use crate::hooks::{self, HookDecision, PreToolUseHook, PreToolUseInput};
use crate::message_parser::parse_message;
use crate::options::AgentOptions;
use crate::transport::{SubprocessCliTransport, Transport};
use crate::types::Message;
use async_stream::stream;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};

const INITIALIZE_TIMEOUT_SECS: u64 = 60;
const CONTROL_TIMEOUT_SECS: u64 = 60;
const MESSAGE_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone)]
enum ControlMessage {
    Data(serde_json::Value),
    End,
    Error(String),
}

enum WriteCommand {
    Data(String),
    EndInput,
    Shutdown,
}

/// Client for interactive, multi-turn conversations with the agent CLI.
pub struct AgentClient {
    options: AgentOptions,
    conn: Option<Conn>,
}

impl AgentClient {
    pub fn new(options: AgentOptions) -> Self {
        Self {
            options,
            conn: None,
        }
    }

    /// Spawn the CLI and perform the initialize handshake.
    pub async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let mut transport = SubprocessCliTransport::new(self.options.clone())?;
        transport.connect().await?;

        let hook = self.options.pre_tool_use.clone();
        let conn = Conn::start(Box::new(transport), hook.clone());
        conn.initialize(hook.is_some()).await?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Send a prompt, starting a new turn.
    pub async fn query(&self, prompt: &str) -> Result<()> {
        let conn = self.conn.as_ref().ok_or(Error::NotConnected)?;
        conn.write_user_message(prompt, "default").await
    }

    /// Receive all messages for the lifetime of the session.
    pub fn receive_messages(&self) -> Pin<Box<dyn Stream<Item = Result<Message>> + Send>> {
        match self.conn {
            Some(ref conn) => conn.receive_messages(),
            None => Box::pin(futures::stream::once(async { Err(Error::NotConnected) })),
        }
    }

    /// Receive messages until the next [`ResultMessage`](crate::types::ResultMessage),
    /// i.e. one turn. The stream is owned, so [`interrupt`](Self::interrupt)
    /// may be called while it is still being consumed.
    pub fn receive_response(&self) -> Pin<Box<dyn Stream<Item = Result<Message>> + Send>> {
        match self.conn {
            Some(ref conn) => conn.receive_response(),
            None => Box::pin(futures::stream::once(async { Err(Error::NotConnected) })),
        }
    }

    /// Interrupt the current turn. Best-effort: the CLI may emit further
    /// messages before honoring the request.
    pub async fn interrupt(&self) -> Result<()> {
        let conn = self.conn.as_ref().ok_or(Error::NotConnected)?;
        conn.send_control_request(serde_json::json!({"subtype": "interrupt"}))
            .await?;
        Ok(())
    }

    /// Disconnect from the agent, terminating the CLI process.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }
        Ok(())
    }
}

/// One-shot query: send a single prompt and stream messages until the turn
/// completes.
pub fn query(
    prompt: impl Into<String>,
    options: AgentOptions,
) -> impl Stream<Item = Result<Message>> + Send {
    let prompt = prompt.into();
    stream! {
        let mut transport = match SubprocessCliTransport::new(options.clone()) {
            Ok(t) => t,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        if let Err(e) = transport.connect().await {
            yield Err(e);
            return;
        }

        let hook = options.pre_tool_use.clone();
        let conn = Conn::start(Box::new(transport), hook.clone());
        if let Err(e) = conn.initialize(hook.is_some()).await {
            yield Err(e);
            return;
        }
        if let Err(e) = conn.write_user_message(&prompt, "").await {
            yield Err(e);
            return;
        }
        // One-shot: close stdin once the prompt is written.
        if let Err(e) = conn.end_input().await {
            yield Err(e);
            return;
        }

        let mut response = conn.receive_response();
        {
            use futures::StreamExt;
            while let Some(item) = response.next().await {
                match item {
                    Ok(msg) => yield Ok(msg),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
        conn.close().await;
    }
}

/// A live connection: writer task owning the transport, reader task
/// dispatching the control protocol.
struct Conn {
    write_tx: mpsc::Sender<WriteCommand>,
    message_tx: broadcast::Sender<ControlMessage>,
    request_counter: AtomicU64,
}

impl Conn {
    fn start(mut transport: Box<dyn Transport + Send>, hook: Option<PreToolUseHook>) -> Self {
        let (message_tx, _) = broadcast::channel(MESSAGE_BUFFER_SIZE);
        let (write_tx, mut write_rx) = mpsc::channel::<WriteCommand>(64);

        let mut read_stream = transport.read_messages();
        let msg_tx = message_tx.clone();

        // Writer task owns the transport. `Shutdown` (or every sender being
        // dropped) closes it, killing the CLI process.
        tokio::spawn(async move {
            while let Some(cmd) = write_rx.recv().await {
                match cmd {
                    WriteCommand::Data(s) => {
                        let _ = transport.write(&format!("{}\n", s)).await;
                    }
                    WriteCommand::EndInput => {
                        let _ = transport.end_input().await;
                    }
                    WriteCommand::Shutdown => break,
                }
            }
            let _ = transport.close().await;
        });

        let write_tx_for_read = write_tx.clone();
        tokio::spawn(async move {
            use futures::StreamExt;

            while let Some(item) = read_stream.next().await {
                match item {
                    Ok(data) => {
                        let msg_type = data.get("type").and_then(|v| v.as_str());
                        if msg_type == Some("control_cancel_request") {
                            continue;
                        }
                        if msg_type == Some("control_request") {
                            let request_id = data
                                .get("request_id")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string();
                            if let Err(e) =
                                handle_control_request(&data, &write_tx_for_read, hook.as_ref())
                                    .await
                            {
                                let _ = write_tx_for_read
                                    .send(WriteCommand::Data(format_control_error(
                                        &request_id,
                                        &e.to_string(),
                                    )))
                                    .await;
                            }
                            continue;
                        }
                        let _ = msg_tx.send(ControlMessage::Data(data));
                    }
                    Err(e) => {
                        let _ = msg_tx.send(ControlMessage::Error(e.to_string()));
                        break;
                    }
                }
            }
            let _ = msg_tx.send(ControlMessage::End);
        });

        Self {
            write_tx,
            message_tx,
            request_counter: AtomicU64::new(0),
        }
    }

    async fn initialize(&self, has_hook: bool) -> Result<()> {
        let request_id = self.next_request_id();
        let init_request = serde_json::json!({
            "type": "control_request",
            "request_id": request_id,
            "request": {
                "subtype": "initialize",
                "hooks": hooks::initialize_config(has_hook),
            }
        });

        // Subscribe before sending to avoid missing fast responses.
        let mut rx = self.message_tx.subscribe();
        self.write_tx
            .send(WriteCommand::Data(serde_json::to_string(&init_request)?))
            .await
            .map_err(|_| Error::Other("Write channel closed".to_string()))?;

        let timeout = tokio::time::Duration::from_secs(INITIALIZE_TIMEOUT_SECS);
        tokio::time::timeout(timeout, wait_for_control_response(&mut rx, &request_id))
            .await
            .map_err(|_| Error::ControlTimeout("initialize".to_string()))??;
        Ok(())
    }

    fn next_request_id(&self) -> String {
        let n = self.request_counter.fetch_add(1, Ordering::SeqCst);
        let hash = n.wrapping_mul(2_654_435_761) & 0xFFFF_FFFF;
        format!("req_{}_{:08x}", n, hash)
    }

    async fn send_control_request(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        let request_id = self.next_request_id();
        let full_request = serde_json::json!({
            "type": "control_request",
            "request_id": request_id,
            "request": request
        });

        // Subscribe before sending to avoid missing fast responses.
        let mut rx = self.message_tx.subscribe();
        self.write_tx
            .send(WriteCommand::Data(serde_json::to_string(&full_request)?))
            .await
            .map_err(|_| Error::Other("Write channel closed".to_string()))?;

        let timeout = tokio::time::Duration::from_secs(CONTROL_TIMEOUT_SECS);
        tokio::time::timeout(timeout, wait_for_control_response(&mut rx, &request_id))
            .await
            .map_err(|_| Error::ControlTimeout(request_id))?
    }

    async fn write_user_message(&self, prompt: &str, session_id: &str) -> Result<()> {
        let user_message = serde_json::json!({
            "type": "user",
            "session_id": session_id,
            "message": {"role": "user", "content": prompt},
            "parent_tool_use_id": serde_json::Value::Null
        });
        self.write_tx
            .send(WriteCommand::Data(serde_json::to_string(&user_message)?))
            .await
            .map_err(|_| Error::Other("Write channel closed".to_string()))?;
        Ok(())
    }

    /// Close stdin on the CLI process (one-shot queries).
    async fn end_input(&self) -> Result<()> {
        self.write_tx
            .send(WriteCommand::EndInput)
            .await
            .map_err(|_| Error::Other("Write channel closed".to_string()))?;
        Ok(())
    }

    /// Tear down the connection; the writer task kills the CLI process.
    async fn close(&self) {
        let _ = self.write_tx.send(WriteCommand::Shutdown).await;
    }

    fn receive_messages(&self) -> Pin<Box<dyn Stream<Item = Result<Message>> + Send>> {
        let mut rx = self.message_tx.subscribe();

        let stream = stream! {
            loop {
                match rx.recv().await {
                    Ok(ControlMessage::Data(data)) => {
                        match parse_message(&data) {
                            Ok(Some(m)) => yield Ok(m),
                            Ok(None) => continue, // Forward-compatible: skip unknown types
                            Err(e) => {
                                yield Err(e);
                                continue;
                            }
                        }
                    }
                    Ok(ControlMessage::End) => break,
                    Ok(ControlMessage::Error(e)) => {
                        yield Err(Error::Other(e));
                        break;
                    }
                    Err(_) => break,
                }
            }
        };

        Box::pin(stream)
    }

    fn receive_response(&self) -> Pin<Box<dyn Stream<Item = Result<Message>> + Send>> {
        let mut rx = self.message_tx.subscribe();

        let stream = stream! {
            loop {
                match rx.recv().await {
                    Ok(ControlMessage::Data(data)) => {
                        match parse_message(&data) {
                            Ok(Some(m)) => {
                                let is_result = matches!(&m, Message::Result(_));
                                yield Ok(m);
                                if is_result {
                                    break;
                                }
                            }
                            Ok(None) => continue, // Forward-compatible: skip unknown types
                            Err(e) => {
                                yield Err(e);
                                continue;
                            }
                        }
                    }
                    Ok(ControlMessage::End) => break,
                    Ok(ControlMessage::Error(e)) => {
                        yield Err(Error::Other(e));
                        break;
                    }
                    Err(_) => break,
                }
            }
        };

        Box::pin(stream)
    }
}

async fn wait_for_control_response(
    rx: &mut broadcast::Receiver<ControlMessage>,
    request_id: &str,
) -> Result<serde_json::Value> {
    loop {
        match rx.recv().await {
            Ok(ControlMessage::Data(data)) => {
                if data.get("type").and_then(|v| v.as_str()) != Some("control_response") {
                    continue;
                }
                let resp = data.get("response").and_then(|v| v.as_object());
                let req_id = resp
                    .and_then(|r| r.get("request_id"))
                    .and_then(|v| v.as_str());
                if req_id != Some(request_id) {
                    continue;
                }
                if resp.and_then(|r| r.get("subtype")).and_then(|v| v.as_str()) == Some("error") {
                    let err = resp
                        .and_then(|r| r.get("error"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown");
                    return Err(Error::Other(err.to_string()));
                }
                return Ok(resp
                    .and_then(|r| r.get("response"))
                    .cloned()
                    .unwrap_or(serde_json::Value::Null));
            }
            Ok(ControlMessage::End) => {
                return Err(Error::Other(
                    "Stream ended before control response".to_string(),
                ));
            }
            Ok(ControlMessage::Error(e)) => return Err(Error::Other(e)),
            Err(_) => return Err(Error::Other("Channel closed".to_string())),
        }
    }
}

async fn handle_control_request(
    data: &serde_json::Value,
    write_tx: &mpsc::Sender<WriteCommand>,
    hook: Option<&PreToolUseHook>,
) -> Result<()> {
    let request_id = data
        .get("request_id")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let request_data = data
        .get("request")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::Other("control_request missing request".to_string()))?;
    let subtype = request_data
        .get("subtype")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Other("control_request missing subtype".to_string()))?;

    let response_data = match subtype {
        "hook_callback" => {
            let hook =
                hook.ok_or_else(|| Error::Other("hook callback not configured".to_string()))?;
            let input = request_data
                .get("input")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let tool_use_id = request_data
                .get("tool_use_id")
                .and_then(|v| v.as_str())
                .map(String::from);
            let decision: HookDecision =
                hook(PreToolUseInput::from_wire(&input, tool_use_id)).await;
            decision.to_wire()
        }
        _ => {
            return Err(Error::Other(format!(
                "Unsupported control_request subtype: {}",
                subtype
            )));
        }
    };

    let success_response = serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response_data
        }
    });
    write_tx
        .send(WriteCommand::Data(serde_json::to_string(&success_response)?))
        .await
        .map_err(|_| Error::Other("Write channel closed".to_string()))?;
    Ok(())
}

fn format_control_error(request_id: &str, error: &str) -> String {
    serde_json::to_string(&serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": error
        }
    }))
    .unwrap_or_default()
}

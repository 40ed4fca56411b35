//! One-line rendering of each message class for the session log.

use crate::types::Message;

/// Render a message as a single log line tagged with its class.
pub fn render(message: &Message) -> String {
    match message {
        Message::User(user) => format!("[User] content={:?}", user.content),
        Message::Assistant(assistant) => format!(
            "[Assistant]({}) content={:?}",
            assistant.model, assistant.content
        ),
        Message::System(system) => format!("[System]({}) data={}", system.subtype, system.data),
        Message::Result(result) => format!("[Result]({}) msg={:?}", result.subtype, result),
        Message::StreamEvent(event) => format!("[StreamEvent] msg={:?}", event),
    }
}

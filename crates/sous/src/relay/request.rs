use serde::{Deserialize, Serialize};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Inbound chat request as posted by the browser
///
/// ```json
/// {"messages": [{"role": "user", "content": "Dinner ideas?"}], "systemPrompt": "You are a chef."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system_prompt: String,
}

impl ChatRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            system_prompt: system_prompt.into(),
        }
    }

    /// Conversation sent upstream: the system prompt first, then the
    /// client's messages in order.
    pub fn conversation(&self) -> Vec<Message> {
        std::iter::once(Message::new(Role::System, self.system_prompt.clone()))
            .chain(self.messages.iter().cloned())
            .collect()
    }
}

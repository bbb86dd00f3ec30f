use serde::{Deserialize, Serialize};

/// A conversation message injected by the client, outside the audio stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    role: MessageRole,
    content: Vec<Content>,
}

impl MessageItem {
    /// A typed participant answer.
    pub fn user_text(text: &str) -> Self {
        Self {
            id: None,
            role: MessageRole::User,
            content: vec![Content::InputText {
                text: text.to_string(),
            }],
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    /// Concatenated text parts, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                Content::InputText { text } | Content::OutputText { text } => text.as_str(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    InputText { text: String },
    OutputText { text: String },
}

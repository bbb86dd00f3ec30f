use crate::content::message::MessageItem;
use serde::{Deserialize, Serialize};

/// Conversation items a client can create. Only messages are needed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Message(MessageItem),
}

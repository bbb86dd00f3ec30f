pub mod client;

use client::*;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(SessionUpdateEvent),
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend(InputAudioBufferAppendEvent),
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

impl ClientEvent {
    /// The wire name of the event, as sent in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate(_) => "session.update",
            ClientEvent::InputAudioBufferAppend(_) => "input_audio_buffer.append",
            ClientEvent::ConversationItemCreate(_) => "conversation.item.create",
            ClientEvent::ResponseCreate(_) => "response.create",
        }
    }
}

/// Inbound traffic from the realtime channel.
///
/// Server messages stay untyped JSON. The vocabulary is much larger than what
/// any single consumer needs, so interpretation happens downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(serde_json::Value),
    Close { reason: Option<String> },
}

impl ServerEvent {
    pub fn event_type(&self) -> Option<&str> {
        match self {
            ServerEvent::Message(json) => json.get("type").and_then(|v| v.as_str()),
            ServerEvent::Close { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Item, MessageItem};
    use serde_json::json;

    #[test]
    fn test_response_create_without_config_is_bare() {
        let event = ClientEvent::ResponseCreate(ResponseCreateEvent::new());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({ "type": "response.create" }));
    }

    #[test]
    fn test_response_create_with_inline_instructions() {
        let event = ClientEvent::ResponseCreate(
            ResponseCreateEvent::new().with_response(
                ResponseConfig::new()
                    .with_instructions("Say hello.")
                    .with_temperature(0.0)
                    .with_max_output_tokens(40),
            ),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "response.create",
                "response": {
                    "instructions": "Say hello.",
                    "temperature": 0.0,
                    "max_output_tokens": 40
                }
            })
        );
    }

    #[test]
    fn test_conversation_item_create_shape() {
        let item = MessageItem::user_text("I work in sales.");
        let event =
            ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(Item::Message(item)));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{ "type": "input_text", "text": "I work in sales." }]
                }
            })
        );
        assert_eq!(event.kind(), "conversation.item.create");
    }
}

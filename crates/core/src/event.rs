//! Classification of inbound realtime messages.
//!
//! The realtime channel emits far more event types than the interview needs.
//! [`classify`] runs once per message and reduces it to an [`InboundEvent`],
//! so the transcript and the controller only ever match on a closed set.

use serde_json::Value;

const ASSISTANT_DELTA: &str = "response.output_audio_transcript.delta";
const ASSISTANT_DONE: &str = "response.output_audio_transcript.done";
const USER_TRANSCRIPT_TYPES: [&str; 2] = [
    "conversation.item.input_audio_transcription.completed",
    "input_audio_transcription.completed",
];

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SessionCreated,
    SessionUpdated {
        instructions: Option<String>,
    },
    /// A completed participant utterance. `item_id` is `None` when the event
    /// carried no usable identifier.
    UserTranscript {
        item_id: Option<String>,
        text: String,
    },
    AssistantDelta {
        key: String,
        delta: String,
    },
    AssistantDone {
        key: String,
        text: String,
        audio: bool,
    },
    Error {
        message: String,
    },
    Irrelevant,
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| str_field(value, key))
}

fn index_part(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Groups every delta of one utterance under the same key.
pub fn assistant_key(event: &Value) -> String {
    let response_id = str_field(event, "response_id")
        .or_else(|| event.get("response").and_then(|r| str_field(r, "id")));
    let item_id = first_str(event, &["item_id", "output_item_id"]);
    let output_index = index_part(event, "output_index");
    let content_index = index_part(event, "content_index");

    if response_id.is_some()
        || item_id.is_some()
        || output_index.is_some()
        || content_index.is_some()
    {
        return format!(
            "{}:{}:{}:{}",
            response_id.unwrap_or("response"),
            item_id.unwrap_or("item"),
            output_index.as_deref().unwrap_or("output"),
            content_index.as_deref().unwrap_or("content"),
        );
    }

    first_str(event, &["event_id", "id"])
        .unwrap_or("assistant")
        .to_string()
}

fn transcription_text(payload: &Value) -> Option<&str> {
    first_str(payload, &["transcript", "text"])
}

fn transcript_from_user_item(item: &Value) -> Option<&str> {
    if let Some(text) = item
        .get("input_audio_transcription")
        .and_then(transcription_text)
    {
        return Some(text);
    }
    item.get("content")
        .and_then(Value::as_array)?
        .iter()
        .find_map(|part| {
            if let Some(text) = part
                .get("input_audio_transcription")
                .and_then(transcription_text)
            {
                return Some(text);
            }
            match str_field(part, "type") {
                Some("input_audio") | Some("input_audio_transcription") => {
                    transcription_text(part)
                }
                _ => None,
            }
        })
}

fn is_typed_text_echo(event: &Value) -> bool {
    let Some(item) = event.get("item") else {
        return false;
    };
    str_field(item, "role") == Some("user")
        && item
            .get("content")
            .and_then(Value::as_array)
            .is_some_and(|parts| {
                parts.iter().any(|part| {
                    str_field(part, "type") == Some("input_text")
                        && part.get("text").is_some_and(Value::is_string)
                })
            })
}

fn event_item_id(event: &Value) -> Option<&str> {
    str_field(event, "item_id")
        .or_else(|| event.get("item").and_then(|i| str_field(i, "id")))
        .or_else(|| first_str(event, &["event_id", "id"]))
}

fn user_transcript(event: &Value, kind: &str) -> Option<(Option<String>, String)> {
    if let Some(payload) = event.get("input_audio_transcription") {
        if let Some(text) = transcription_text(payload) {
            let id = str_field(payload, "item_id").or_else(|| event_item_id(event));
            return Some((id.map(str::to_string), text.to_string()));
        }
    }

    if let Some(item) = event
        .get("item")
        .filter(|item| str_field(item, "role") == Some("user"))
    {
        if let Some(text) = transcript_from_user_item(item) {
            let id = str_field(item, "id")
                .or_else(|| str_field(event, "item_id"))
                .or_else(|| first_str(event, &["event_id", "id"]));
            return Some((id.map(str::to_string), text.to_string()));
        }
    }

    let names_input_transcript = kind.contains("input_audio_transcription")
        || (kind.contains("input_audio_transcript") && !kind.contains("output_audio_transcript"));
    if !names_input_transcript {
        return None;
    }
    transcription_text(event)
        .map(|text| (event_item_id(event).map(str::to_string), text.to_string()))
}

fn is_audio_done(kind: &str) -> bool {
    kind.contains("output_audio") && kind.contains("transcript") && kind.contains("done")
}

/// Reduces one raw inbound message to the event vocabulary the interview uses.
pub fn classify(event: &Value) -> InboundEvent {
    let Some(kind) = str_field(event, "type") else {
        return InboundEvent::Irrelevant;
    };

    match kind {
        "session.created" => return InboundEvent::SessionCreated,
        "session.updated" => {
            let instructions = event
                .pointer("/session/instructions")
                .and_then(Value::as_str)
                .map(str::to_string);
            return InboundEvent::SessionUpdated { instructions };
        }
        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown realtime error")
                .to_string();
            return InboundEvent::Error { message };
        }
        _ => {}
    }

    if USER_TRANSCRIPT_TYPES.contains(&kind) {
        return match user_transcript(event, kind) {
            Some((item_id, text)) => InboundEvent::UserTranscript { item_id, text },
            None => InboundEvent::Irrelevant,
        };
    }

    if is_typed_text_echo(event) {
        return InboundEvent::Irrelevant;
    }

    if let Some((item_id, text)) = user_transcript(event, kind) {
        return InboundEvent::UserTranscript { item_id, text };
    }

    match kind {
        ASSISTANT_DELTA => {
            let delta = first_str(event, &["delta", "text", "transcript"]).unwrap_or_default();
            InboundEvent::AssistantDelta {
                key: assistant_key(event),
                delta: delta.to_string(),
            }
        }
        ASSISTANT_DONE => {
            let text = first_str(event, &["text", "transcript", "delta"]).unwrap_or_default();
            InboundEvent::AssistantDone {
                key: assistant_key(event),
                text: text.to_string(),
                audio: is_audio_done(kind),
            }
        }
        _ => InboundEvent::Irrelevant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_key_uses_all_slots() {
        let event = json!({
            "type": ASSISTANT_DELTA,
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "Hi"
        });
        assert_eq!(assistant_key(&event), "resp_1:item_1:0:0");
    }

    #[test]
    fn test_assistant_key_fills_missing_slots_with_placeholders() {
        let event = json!({ "response": { "id": "resp_9" }, "output_item_id": "it" });
        assert_eq!(assistant_key(&event), "resp_9:it:output:content");

        let event = json!({ "content_index": 1 });
        assert_eq!(assistant_key(&event), "response:item:output:1");
    }

    #[test]
    fn test_assistant_key_falls_back_to_event_id_then_constant() {
        assert_eq!(assistant_key(&json!({ "event_id": "evt_3" })), "evt_3");
        assert_eq!(assistant_key(&json!({ "type": ASSISTANT_DELTA })), "assistant");
    }

    #[test]
    fn test_concurrent_responses_get_distinct_keys() {
        let a = json!({ "response_id": "r1", "item_id": "i1", "output_index": 0, "content_index": 0 });
        let b = json!({ "response_id": "r2", "item_id": "i2", "output_index": 0, "content_index": 0 });
        assert_ne!(assistant_key(&a), assistant_key(&b));
    }

    #[test]
    fn test_classify_assistant_delta_and_done() {
        let delta = json!({ "type": ASSISTANT_DELTA, "response_id": "r", "delta": "Hel" });
        assert_eq!(
            classify(&delta),
            InboundEvent::AssistantDelta {
                key: "r:item:output:content".into(),
                delta: "Hel".into()
            }
        );

        let done = json!({ "type": ASSISTANT_DONE, "response_id": "r", "transcript": "Hello" });
        assert_eq!(
            classify(&done),
            InboundEvent::AssistantDone {
                key: "r:item:output:content".into(),
                text: "Hello".into(),
                audio: true
            }
        );
    }

    #[test]
    fn test_classify_transcription_completed() {
        let event = json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_user_1",
            "transcript": "I'm a CSM"
        });
        assert_eq!(
            classify(&event),
            InboundEvent::UserTranscript {
                item_id: Some("item_user_1".into()),
                text: "I'm a CSM".into()
            }
        );
    }

    #[test]
    fn test_classify_embedded_transcription_prefers_its_item_id() {
        let event = json!({
            "type": "conversation.item.updated",
            "item_id": "outer",
            "input_audio_transcription": { "transcript": "Yes", "item_id": "inner" }
        });
        assert_eq!(
            classify(&event),
            InboundEvent::UserTranscript {
                item_id: Some("inner".into()),
                text: "Yes".into()
            }
        );
    }

    #[test]
    fn test_classify_user_item_with_audio_part() {
        let event = json!({
            "type": "conversation.item.done",
            "item": {
                "id": "item_7",
                "role": "user",
                "content": [{ "type": "input_audio", "transcript": "We use GPTs daily" }]
            }
        });
        assert_eq!(
            classify(&event),
            InboundEvent::UserTranscript {
                item_id: Some("item_7".into()),
                text: "We use GPTs daily".into()
            }
        );
    }

    #[test]
    fn test_classify_ignores_typed_text_echo() {
        let event = json!({
            "type": "conversation.item.added",
            "item": {
                "id": "item_8",
                "role": "user",
                "content": [{ "type": "input_text", "text": "typed answer" }]
            }
        });
        assert_eq!(classify(&event), InboundEvent::Irrelevant);
    }

    #[test]
    fn test_classify_generic_input_transcript_type() {
        let event = json!({ "type": "input_audio_transcript.final", "text": "Sure" });
        assert_eq!(
            classify(&event),
            InboundEvent::UserTranscript {
                item_id: None,
                text: "Sure".into()
            }
        );
    }

    #[test]
    fn test_classify_session_events_and_error() {
        assert_eq!(
            classify(&json!({ "type": "session.created" })),
            InboundEvent::SessionCreated
        );
        assert_eq!(
            classify(&json!({ "type": "session.updated", "session": { "instructions": "You are" } })),
            InboundEvent::SessionUpdated {
                instructions: Some("You are".into())
            }
        );
        assert_eq!(
            classify(&json!({ "type": "error", "error": { "message": "bad" } })),
            InboundEvent::Error {
                message: "bad".into()
            }
        );
    }

    #[test]
    fn test_classify_malformed_is_irrelevant() {
        assert_eq!(classify(&json!("text")), InboundEvent::Irrelevant);
        assert_eq!(classify(&json!({ "no_type": true })), InboundEvent::Irrelevant);
        assert_eq!(
            classify(&json!({ "type": "response.output_text.delta", "delta": "x" })),
            InboundEvent::Irrelevant
        );
    }
}

use crate::event::InboundEvent;
use chrono::{Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Speaker of a turn. Serialised with the realtime channel's role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "assistant", alias = "interviewer")]
    Interviewer,
    #[serde(rename = "user", alias = "participant")]
    Participant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Interviewer => "assistant",
            Role::Participant => "user",
        }
    }

    fn speaker_label(&self) -> &'static str {
        match self {
            Role::Interviewer => "INTERVIEWER",
            Role::Participant => "PARTICIPANT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Draft,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub status: TurnStatus,
    pub timestamp: String,
    #[serde(rename = "timestampIso")]
    pub timestamp_iso: String,
    #[serde(skip)]
    source_key: Option<String>,
}

impl TranscriptTurn {
    fn new(id: String, role: Role, text: String, status: TurnStatus) -> Self {
        Self {
            id,
            role,
            text,
            status,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            timestamp_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            source_key: None,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == TurnStatus::Draft
    }
}

/// A finished turn as handed to report generation and persisted in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(
        rename = "timestampIso",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp_iso: Option<String>,
}

impl SnapshotTurn {
    pub fn new(role: Role, text: &str) -> Self {
        Self {
            id: None,
            role,
            text: text.to_string(),
            timestamp: None,
            timestamp_iso: None,
        }
    }
}

impl From<&TranscriptTurn> for SnapshotTurn {
    fn from(turn: &TranscriptTurn) -> Self {
        Self {
            id: Some(turn.id.clone()),
            role: turn.role,
            text: turn.text.clone(),
            timestamp: Some(turn.timestamp.clone()),
            timestamp_iso: Some(turn.timestamp_iso.clone()),
        }
    }
}

fn new_turn_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builds an ordered, speaker-labelled transcript out of streaming events.
///
/// Interviewer speech arrives as deltas followed by a terminal "done" event.
/// Each utterance owns at most one open draft, keyed by the event's
/// response/item/slot key. Participant speech arrives as whole transcripts
/// and is upserted by item id.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    turns: Vec<TranscriptTurn>,
    drafts: HashMap<String, String>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one classified event. Returns `true` if the transcript changed.
    pub fn ingest(&mut self, event: &InboundEvent) -> bool {
        match event {
            InboundEvent::UserTranscript { item_id, text } => {
                let id = item_id.clone().unwrap_or_else(new_turn_id);
                self.upsert_user(&id, text)
            }
            InboundEvent::AssistantDelta { key, delta } => self.append_delta(key, delta),
            InboundEvent::AssistantDone { key, text, .. } => self.finalize_assistant(key, text),
            _ => false,
        }
    }

    fn upsert_user(&mut self, id: &str, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        if let Some(turn) = self.turns.iter_mut().find(|t| t.id == id) {
            let changed = turn.text != text || turn.is_draft();
            turn.text = text.to_string();
            turn.status = TurnStatus::Final;
            return changed;
        }
        tracing::debug!(item_id = %id, "participant turn: {}", crate::preview(text, 120));
        self.turns.push(TranscriptTurn::new(
            id.to_string(),
            Role::Participant,
            text.to_string(),
            TurnStatus::Final,
        ));
        true
    }

    fn append_delta(&mut self, key: &str, delta: &str) -> bool {
        if delta.is_empty() {
            return false;
        }
        if let Some(draft_id) = self.drafts.get(key) {
            if let Some(turn) = self.turns.iter_mut().find(|t| &t.id == draft_id) {
                turn.text.push_str(delta);
                turn.status = TurnStatus::Draft;
                return true;
            }
        }
        let mut turn = TranscriptTurn::new(
            new_turn_id(),
            Role::Interviewer,
            delta.to_string(),
            TurnStatus::Draft,
        );
        turn.source_key = Some(key.to_string());
        self.drafts.insert(key.to_string(), turn.id.clone());
        self.turns.push(turn);
        true
    }

    fn finalize_assistant(&mut self, key: &str, final_text: &str) -> bool {
        let target = match self.drafts.remove(key) {
            Some(draft_id) => self.turns.iter().position(|t| t.id == draft_id),
            None => self
                .turns
                .iter()
                .position(|t| t.source_key.as_deref() == Some(key)),
        };

        if let Some(index) = target {
            let turn = &mut self.turns[index];
            let before = (turn.text.clone(), turn.status);
            if !final_text.is_empty() {
                turn.text = final_text.to_string();
            }
            turn.status = TurnStatus::Final;
            return before != (turn.text.clone(), turn.status);
        }

        if final_text.is_empty() {
            return false;
        }
        let mut turn = TranscriptTurn::new(
            new_turn_id(),
            Role::Interviewer,
            final_text.to_string(),
            TurnStatus::Final,
        );
        turn.source_key = Some(key.to_string());
        self.turns.push(turn);
        true
    }

    /// Records a typed participant message, final immediately.
    pub fn record_local_user_turn(&mut self, text: &str) -> Option<String> {
        let id = new_turn_id();
        self.upsert_user(&id, text).then_some(id)
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// Finished turns in order, the only view that may reach report generation.
    pub fn downstream_snapshot(&self) -> Vec<SnapshotTurn> {
        self.turns
            .iter()
            .filter(|t| !t.is_draft() && !t.text.trim().is_empty())
            .map(SnapshotTurn::from)
            .collect()
    }

    /// The most recent non-empty final participant turn.
    pub fn last_participant_answer(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .filter(|t| t.role == Role::Participant && !t.is_draft())
            .map(|t| t.text.trim())
            .find(|text| !text.is_empty())
    }

    pub fn to_csv(&self, interview_id: &str) -> String {
        let mut lines = vec![
            ["interview_id", "turn_index", "speaker", "text", "iso_time"]
                .map(csv_cell)
                .join(","),
        ];
        let finished = self.turns.iter().filter(|t| !t.is_draft());
        for (index, turn) in finished.enumerate() {
            let row = [
                csv_cell(interview_id),
                csv_cell(&(index + 1).to_string()),
                csv_cell(turn.role.speaker_label()),
                csv_cell(&turn.text),
                csv_cell(&turn.timestamp_iso),
            ];
            lines.push(row.join(","));
        }
        lines.join("\n")
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        self.drafts.clear();
    }
}

fn csv_cell(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    if value.contains(['"', ',', '\n']) {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(key: &str, text: &str) -> InboundEvent {
        InboundEvent::AssistantDelta {
            key: key.into(),
            delta: text.into(),
        }
    }

    fn done(key: &str, text: &str) -> InboundEvent {
        InboundEvent::AssistantDone {
            key: key.into(),
            text: text.into(),
            audio: true,
        }
    }

    fn user(id: Option<&str>, text: &str) -> InboundEvent {
        InboundEvent::UserTranscript {
            item_id: id.map(str::to_string),
            text: text.into(),
        }
    }

    #[test]
    fn test_deltas_concatenate_into_one_draft() {
        let mut transcript = TranscriptAssembler::new();
        for piece in ["Hi, ", "are you ", "happy to continue?"] {
            transcript.ingest(&delta("r1:i1:0:0", piece));
        }

        assert_eq!(transcript.turns().len(), 1);
        let turn = &transcript.turns()[0];
        assert_eq!(turn.text, "Hi, are you happy to continue?");
        assert_eq!(turn.role, Role::Interviewer);
        assert!(turn.is_draft());
    }

    #[test]
    fn test_interleaved_utterances_stay_separate() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&delta("a", "one "));
        transcript.ingest(&delta("b", "uno "));
        transcript.ingest(&delta("a", "two"));
        transcript.ingest(&delta("b", "dos"));

        let texts: Vec<_> = transcript.turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["one two", "uno dos"]);
    }

    #[test]
    fn test_done_replaces_draft_text_and_finalizes() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&delta("k", "What's your"));
        transcript.ingest(&done("k", "What's your role?"));

        assert_eq!(transcript.turns().len(), 1);
        assert_eq!(transcript.turns()[0].text, "What's your role?");
        assert_eq!(transcript.turns()[0].status, TurnStatus::Final);
    }

    #[test]
    fn test_done_without_text_keeps_accumulated_draft() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&delta("k", "Thanks"));
        transcript.ingest(&done("k", ""));

        assert_eq!(transcript.turns()[0].text, "Thanks");
        assert_eq!(transcript.turns()[0].status, TurnStatus::Final);
    }

    #[test]
    fn test_duplicate_done_leaves_transcript_unchanged() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&delta("k", "Hello"));
        assert!(transcript.ingest(&done("k", "Hello there")));
        let before = transcript.turns().to_vec();

        assert!(!transcript.ingest(&done("k", "Hello there")));
        assert!(!transcript.ingest(&done("k", "")));
        assert_eq!(transcript.turns(), before.as_slice());
    }

    #[test]
    fn test_done_without_draft_appends_only_when_non_empty() {
        let mut transcript = TranscriptAssembler::new();
        assert!(!transcript.ingest(&done("k", "")));
        assert!(transcript.turns().is_empty());

        assert!(transcript.ingest(&done("k", "Welcome")));
        assert_eq!(transcript.turns().len(), 1);
        assert_eq!(transcript.turns()[0].status, TurnStatus::Final);
    }

    #[test]
    fn test_user_transcript_upserts_by_item_id() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&user(Some("item_1"), "  I'm a CS "));
        transcript.ingest(&delta("k", "Great"));
        transcript.ingest(&user(Some("item_1"), "I'm a CSM"));

        assert_eq!(transcript.turns().len(), 2);
        assert_eq!(transcript.turns()[0].id, "item_1");
        assert_eq!(transcript.turns()[0].text, "I'm a CSM");
    }

    #[test]
    fn test_user_transcript_ignores_blank_text() {
        let mut transcript = TranscriptAssembler::new();
        assert!(!transcript.ingest(&user(Some("item_1"), "   ")));
        assert!(transcript.turns().is_empty());
    }

    #[test]
    fn test_user_transcript_without_id_gets_generated_one() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&user(None, "Yes"));
        transcript.ingest(&user(None, "Yes"));
        assert_eq!(transcript.turns().len(), 2);
        assert_ne!(transcript.turns()[0].id, transcript.turns()[1].id);
    }

    #[test]
    fn test_irrelevant_events_are_ignored() {
        let mut transcript = TranscriptAssembler::new();
        assert!(!transcript.ingest(&InboundEvent::Irrelevant));
        assert!(!transcript.ingest(&InboundEvent::SessionCreated));
        assert!(transcript.turns().is_empty());
    }

    #[test]
    fn test_downstream_snapshot_excludes_drafts() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&done("a", "Hi, are you happy to continue?"));
        transcript.ingest(&user(Some("u1"), "Yes"));
        transcript.ingest(&delta("b", "What's your"));

        let snapshot = transcript.downstream_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].role, Role::Interviewer);
        assert_eq!(snapshot[1].text, "Yes");
    }

    #[test]
    fn test_last_participant_answer_and_local_turns() {
        let mut transcript = TranscriptAssembler::new();
        assert_eq!(transcript.last_participant_answer(), None);

        transcript.ingest(&user(Some("u1"), "Mostly drafting emails"));
        let id = transcript.record_local_user_turn("  typed reply ");
        assert!(id.is_some());
        assert_eq!(transcript.record_local_user_turn("  "), None);
        transcript.ingest(&done("a", "Tell me more."));

        assert_eq!(transcript.last_participant_answer(), Some("typed reply"));
    }

    #[test]
    fn test_to_csv_quotes_and_skips_drafts() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&done("a", "Hi, \"friend\""));
        transcript.ingest(&user(Some("u1"), "Yes"));
        transcript.ingest(&delta("b", "draft"));

        let csv = transcript.to_csv("iv-1");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "interview_id,turn_index,speaker,text,iso_time");
        assert!(lines[1].starts_with("iv-1,1,INTERVIEWER,\"Hi, \"\"friend\"\"\","));
        assert!(lines[2].starts_with("iv-1,2,PARTICIPANT,Yes,"));
    }

    #[test]
    fn test_reset_clears_turns_and_drafts() {
        let mut transcript = TranscriptAssembler::new();
        transcript.ingest(&delta("k", "Hello"));
        transcript.reset();
        transcript.ingest(&delta("k", "Fresh"));

        assert_eq!(transcript.turns().len(), 1);
        assert_eq!(transcript.turns()[0].text, "Fresh");
    }

    #[test]
    fn test_snapshot_turn_wire_shape() {
        let turn: SnapshotTurn =
            serde_json::from_str(r#"{"role":"interviewer","text":"Hi"}"#).unwrap();
        assert_eq!(turn.role, Role::Interviewer);
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "assistant", "text": "Hi" }));
    }
}

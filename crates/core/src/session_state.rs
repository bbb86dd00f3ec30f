//! The interview protocol controller.
//!
//! [`InterviewSession::handle`] takes one [`Input`] at a time and returns the
//! [`Command`]s the runtime must carry out. It performs no I/O and reads no
//! clock: timers are requested with `Command::Schedule` and come back as
//! `Input::TimerFired`, so every transition can be driven from a test.

use crate::event::InboundEvent;
use crate::heuristics::{self, CONSENT_QUESTION};
use crate::prompts::{self, PERSONA};
use crate::transcript::TranscriptAssembler;
use crate::{Command, preview};
use openai_realtime_types::audio::{InputAudioTranscription, TranscriptionModel, Voice};
use openai_realtime_types::events::client::{
    ConversationItemCreateEvent, ResponseConfig, ResponseCreateEvent, SessionUpdateEvent,
};
use openai_realtime_types::{ClientEvent, Item, MessageItem, Session};
use std::collections::HashMap;
use std::time::Duration;

/// Wait for the echoed configuration before re-sending it.
pub const CONFIG_CONFIRMATION_WAIT: Duration = Duration::from_secs(2);
/// Re-sends allowed before the initial prompt is withheld for good.
pub const MAX_CONFIG_RETRIES: u8 = 2;
pub const CONSENT_FALLBACK_DELAY: Duration = Duration::from_millis(200);
/// Upper bound on the recap quote sent when resuming.
pub const RESUME_QUOTE_CHARS: usize = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    /// Channel open, waiting for `session.created`.
    Configuring,
    /// Configuration sent, waiting for it to be echoed back.
    AwaitingFirstQuestion,
    Live,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Voice,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ConfigRetry,
    /// Armed when the opening line asked for consent; prompts only if no
    /// follow-up went out in the meantime.
    ConsentCheck,
    /// Armed when the first spoken line skipped the consent question.
    ConsentPrompt,
}

/// Identifies one arming of a timer. A fired token that is no longer the
/// armed one is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControllerError {
    #[error("realtime channel is not open, {0} was not sent")]
    ChannelNotOpen(&'static str),
    #[error("failed to open realtime channel: {0}")]
    ConnectFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Start,
    ChannelOpened,
    ChannelFailed(String),
    ChannelClosed,
    Server(InboundEvent),
    TimerFired(TimerToken),
    Pause,
    Resume,
    Stop,
    SendText(String),
    SetInputMode(InputMode),
}

/// What the interviewer is configured with for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewConfig {
    pub instructions: String,
    pub persona: Option<String>,
    pub model: String,
    pub voice: Voice,
    pub transcription_model: TranscriptionModel,
    pub transcription_prompt: String,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            instructions: prompts::DEFAULT_INTERVIEWER_PROMPT.to_string(),
            persona: Some(PERSONA.to_string()),
            model: "gpt-realtime".to_string(),
            voice: Voice::Shimmer,
            transcription_model: TranscriptionModel::Gpt4oTranscribe,
            transcription_prompt: prompts::TRANSCRIPTION_VOCABULARY.to_string(),
        }
    }
}

impl InterviewConfig {
    /// The `session.update` that installs the interviewer persona.
    pub fn session_update(&self) -> ClientEvent {
        let transcription = InputAudioTranscription::new()
            .with_model(self.transcription_model.clone())
            .with_language("en")
            .with_prompt(&self.transcription_prompt);
        let session = Session::new()
            .with_model(&self.model)
            .with_instructions(self.instructions.trim())
            .with_voice(self.voice.clone())
            .with_input_audio_transcription(transcription)
            .build();
        ClientEvent::SessionUpdate(SessionUpdateEvent::new(session))
    }

    pub fn is_confirmed_by(&self, echoed: &str) -> bool {
        heuristics::echoes_instructions(echoed, &self.instructions, self.persona.as_deref())
    }
}

/// Latches and counters for one interview attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub interview_id: String,
    pub input_mode: InputMode,
    pub channel_open: bool,
    /// Set when the channel failed to open; cleared by the next start.
    pub connect_error: Option<String>,
    pub configured_once: bool,
    pub first_question_sent: bool,
    pub session_ready_confirmed: bool,
    pub pending_initial_response: bool,
    pub retry_count: u8,
    /// Confirmation never arrived and prompts are being withheld.
    pub degraded: bool,
    pub interview_ended: bool,
    first_audio_done_seen: bool,
    consent_followup_sent: bool,
    initial_greeting_seen: bool,
    id_used: bool,
    armed: HashMap<TimerKind, u64>,
    next_generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            interview_id: new_interview_id(),
            input_mode: InputMode::Voice,
            channel_open: false,
            connect_error: None,
            configured_once: false,
            first_question_sent: false,
            session_ready_confirmed: false,
            pending_initial_response: false,
            retry_count: 0,
            degraded: false,
            interview_ended: false,
            first_audio_done_seen: false,
            consent_followup_sent: false,
            initial_greeting_seen: false,
            id_used: false,
            armed: HashMap::new(),
            next_generation: 0,
        }
    }
}

fn new_interview_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SessionState {
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    fn reset_handshake(&mut self) {
        self.configured_once = false;
        self.first_question_sent = false;
        self.session_ready_confirmed = false;
        self.pending_initial_response = false;
        self.retry_count = 0;
        self.degraded = false;
        self.reset_consent();
    }

    fn reset_consent(&mut self) {
        self.first_audio_done_seen = false;
        self.consent_followup_sent = false;
        self.initial_greeting_seen = false;
    }

    fn arm(&mut self, kind: TimerKind, after: Duration, commands: &mut Vec<Command>) {
        self.disarm(kind, commands);
        self.next_generation += 1;
        let timer = TimerToken {
            kind,
            generation: self.next_generation,
        };
        self.armed.insert(kind, timer.generation);
        commands.push(Command::Schedule { timer, after });
    }

    fn disarm(&mut self, kind: TimerKind, commands: &mut Vec<Command>) {
        if let Some(generation) = self.armed.remove(&kind) {
            commands.push(Command::Cancel(TimerToken { kind, generation }));
        }
    }

    fn disarm_all(&mut self, commands: &mut Vec<Command>) {
        for kind in [
            TimerKind::ConfigRetry,
            TimerKind::ConsentCheck,
            TimerKind::ConsentPrompt,
        ] {
            self.disarm(kind, commands);
        }
    }

    /// Consumes `timer` if it is the currently armed one.
    fn take_fired(&mut self, timer: TimerToken) -> bool {
        if self.armed.get(&timer.kind) == Some(&timer.generation) {
            self.armed.remove(&timer.kind);
            true
        } else {
            false
        }
    }
}

/// Builds the continuation instruction sent on resume.
pub fn resume_instructions(last_answer: Option<&str>) -> String {
    match last_answer {
        Some(answer) => {
            let quote = heuristics::truncate_chars(answer.trim(), RESUME_QUOTE_CHARS);
            format!(
                "You are resuming a paused ChatGPT Enterprise usage interview.\n\
                 Start your next message with: \"Welcome back, previously we were discussing …\"\n\
                 In 1–2 sentences, briefly recap (do not repeat verbatim) the participant's most recent answer:\n\
                 \"{quote}\"\n\
                 Then continue the interview exactly where you left off: if you had asked a question that has not been answered yet, repeat that single question; otherwise ask the next best single interview question. Do not restart the interview."
            )
        }
        None => "You are resuming a paused ChatGPT Enterprise usage interview.\n\
                 Start your next message with: \"Welcome back, previously we were discussing …\"\n\
                 In 1 sentence, briefly recap where we left off, then continue exactly where you left off by asking the next best single interview question. Do not restart the interview."
            .to_string(),
    }
}

/// The short forced prompt used when the model skipped the consent question.
pub fn consent_prompt() -> ClientEvent {
    let config = ResponseConfig::new()
        .with_temperature(0.0)
        .with_max_output_tokens(40)
        .with_instructions(&format!(
            "{} Wait for the participant's reply.",
            CONSENT_QUESTION
        ));
    ClientEvent::ResponseCreate(ResponseCreateEvent::new().with_response(config))
}

/// One interviewer-to-participant conversation and everything it remembers.
pub struct InterviewSession {
    config: InterviewConfig,
    state: SessionState,
    transcript: TranscriptAssembler,
}

impl InterviewSession {
    pub fn new(config: InterviewConfig) -> Self {
        Self {
            config,
            state: SessionState::default(),
            transcript: TranscriptAssembler::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transcript(&self) -> &TranscriptAssembler {
        &self.transcript
    }

    pub fn interview_id(&self) -> &str {
        &self.state.interview_id
    }

    pub fn handle(&mut self, input: Input) -> Vec<Command> {
        let mut commands = Vec::new();
        match input {
            Input::Start => self.on_start(&mut commands),
            Input::ChannelOpened => self.on_channel_opened(&mut commands),
            Input::ChannelFailed(reason) => self.on_channel_failed(reason, &mut commands),
            Input::ChannelClosed => self.on_channel_closed(&mut commands),
            Input::Server(event) => self.on_server_event(event, &mut commands),
            Input::TimerFired(timer) => self.on_timer(timer, &mut commands),
            Input::Pause => self.on_pause(&mut commands),
            Input::Resume => self.on_resume(&mut commands),
            Input::Stop => self.on_stop(&mut commands),
            Input::SendText(text) => self.on_send_text(&text, &mut commands),
            Input::SetInputMode(mode) => self.on_input_mode(mode, &mut commands),
        }
        commands
    }

    fn send(&self, event: ClientEvent, commands: &mut Vec<Command>) {
        if self.state.channel_open {
            commands.push(Command::Send(event));
        } else {
            tracing::error!(event_type = event.kind(), "channel not open, event dropped");
            commands.push(Command::Failed(ControllerError::ChannelNotOpen(
                event.kind(),
            )));
        }
    }

    fn mark_ended(&mut self, commands: &mut Vec<Command>) {
        if self.state.phase != Phase::Idle {
            self.state.phase = Phase::Ended;
        }
        if self.state.interview_ended || !self.state.id_used {
            return;
        }
        self.state.interview_ended = true;
        tracing::info!(interview_id = %self.state.interview_id, "interview ended");
        commands.push(Command::InterviewEnded {
            interview_id: self.state.interview_id.clone(),
        });
    }

    fn on_start(&mut self, commands: &mut Vec<Command>) {
        if !matches!(self.state.phase, Phase::Idle | Phase::Ended) {
            tracing::debug!(phase = ?self.state.phase, "start ignored, session already running");
            return;
        }
        if self.state.id_used {
            self.state.interview_id = new_interview_id();
        }
        self.state.id_used = true;
        self.state.disarm_all(commands);
        self.state.reset_handshake();
        self.state.interview_ended = false;
        self.state.connect_error = None;
        self.state.input_mode = InputMode::Voice;
        self.transcript.reset();
        self.state.phase = Phase::Connecting;
        tracing::info!(interview_id = %self.state.interview_id, "connecting");
        commands.push(Command::Connect);
    }

    fn on_channel_opened(&mut self, commands: &mut Vec<Command>) {
        if self.state.phase != Phase::Connecting {
            tracing::debug!(phase = ?self.state.phase, "unexpected channel open");
            return;
        }
        tracing::info!(interview_id = %self.state.interview_id, "realtime channel open");
        self.state.channel_open = true;
        self.state.disarm_all(commands);
        self.state.reset_handshake();
        self.state.phase = Phase::Configuring;
        commands.push(Command::SetMicrophone(
            self.state.input_mode == InputMode::Voice,
        ));
    }

    fn on_channel_failed(&mut self, reason: String, commands: &mut Vec<Command>) {
        if self.state.phase != Phase::Connecting {
            return;
        }
        tracing::error!(interview_id = %self.state.interview_id, "failed to start session: {}", reason);
        self.state.phase = Phase::Idle;
        self.state.connect_error = Some(reason.clone());
        commands.push(Command::Failed(ControllerError::ConnectFailed(reason)));
    }

    fn on_channel_closed(&mut self, commands: &mut Vec<Command>) {
        if !self.state.channel_open {
            return;
        }
        tracing::info!(interview_id = %self.state.interview_id, "realtime channel closed");
        self.state.channel_open = false;
        self.state.disarm_all(commands);
        self.state.reset_handshake();
        commands.push(Command::ReleaseMicrophone);
        self.mark_ended(commands);
    }

    fn on_stop(&mut self, commands: &mut Vec<Command>) {
        if self.state.phase == Phase::Idle && !self.state.channel_open {
            return;
        }
        tracing::info!(interview_id = %self.state.interview_id, "stopping session");
        commands.push(Command::ReleaseMicrophone);
        if self.state.channel_open || self.state.phase == Phase::Connecting {
            commands.push(Command::CloseChannel);
        }
        self.state.channel_open = false;
        self.state.disarm_all(commands);
        self.state.reset_handshake();
        self.state.input_mode = InputMode::Voice;
        self.mark_ended(commands);
        self.state.phase = Phase::Ended;
        self.state.interview_id = new_interview_id();
        self.state.id_used = false;
    }

    fn on_server_event(&mut self, event: InboundEvent, commands: &mut Vec<Command>) {
        if !self.state.channel_open {
            tracing::debug!("server event after channel close ignored");
            return;
        }
        self.transcript.ingest(&event);

        match event {
            InboundEvent::SessionCreated => self.configure(commands),
            InboundEvent::SessionUpdated { instructions } => {
                self.on_session_updated(instructions.as_deref(), commands)
            }
            InboundEvent::AssistantDone { text, audio, .. } => {
                self.on_assistant_done(&text, audio, commands)
            }
            InboundEvent::Error { message } => {
                tracing::error!(interview_id = %self.state.interview_id, "realtime error: {}", message);
            }
            InboundEvent::UserTranscript { .. }
            | InboundEvent::AssistantDelta { .. }
            | InboundEvent::Irrelevant => {}
        }
    }

    fn configure(&mut self, commands: &mut Vec<Command>) {
        if self.state.configured_once || self.state.phase != Phase::Configuring {
            return;
        }
        self.state.configured_once = true;
        self.state.session_ready_confirmed = false;
        self.state.retry_count = 0;
        self.send_session_update(commands);
        self.state.phase = Phase::AwaitingFirstQuestion;
        self.queue_initial_response(commands);
    }

    fn send_session_update(&self, commands: &mut Vec<Command>) {
        tracing::info!(
            interview_id = %self.state.interview_id,
            "sending session.update: {}",
            preview(&self.config.instructions, 80)
        );
        self.send(self.config.session_update(), commands);
    }

    fn queue_initial_response(&mut self, commands: &mut Vec<Command>) {
        if self.state.first_question_sent {
            return;
        }
        self.state.pending_initial_response = true;
        self.state
            .arm(TimerKind::ConfigRetry, CONFIG_CONFIRMATION_WAIT, commands);
    }

    fn on_session_updated(&mut self, instructions: Option<&str>, commands: &mut Vec<Command>) {
        let confirmed = instructions.is_some_and(|text| self.config.is_confirmed_by(text));
        tracing::info!(
            interview_id = %self.state.interview_id,
            confirmed,
            "session.updated: {}",
            instructions.map(|t| preview(t, 80)).unwrap_or("<none>")
        );
        if !confirmed {
            return;
        }
        self.state.session_ready_confirmed = true;
        self.state.disarm(TimerKind::ConfigRetry, commands);
        self.send_initial_response_if_ready(commands);
    }

    fn send_initial_response_if_ready(&mut self, commands: &mut Vec<Command>) {
        if !self.state.pending_initial_response
            || self.state.first_question_sent
            || !self.state.session_ready_confirmed
        {
            return;
        }
        self.state.first_question_sent = true;
        self.state.pending_initial_response = false;
        self.state.degraded = false;
        self.state.disarm(TimerKind::ConfigRetry, commands);
        self.state.disarm(TimerKind::ConsentCheck, commands);
        self.state.disarm(TimerKind::ConsentPrompt, commands);
        self.state.reset_consent();
        if matches!(
            self.state.phase,
            Phase::AwaitingFirstQuestion | Phase::Live
        ) {
            self.state.phase = Phase::Live;
        }
        tracing::info!(interview_id = %self.state.interview_id, "sending initial question");
        self.send(
            ClientEvent::ResponseCreate(ResponseCreateEvent::new()),
            commands,
        );
    }

    fn on_assistant_done(&mut self, text: &str, audio: bool, commands: &mut Vec<Command>) {
        if self.state.interview_ended {
            return;
        }

        if heuristics::has_consent_question(text) && !self.state.initial_greeting_seen {
            self.state.initial_greeting_seen = true;
            self.state
                .arm(TimerKind::ConsentCheck, CONSENT_FALLBACK_DELAY, commands);
        }

        if audio && !self.state.first_audio_done_seen {
            self.state.first_audio_done_seen = true;
            if !heuristics::has_consent_question(text) && !self.state.consent_followup_sent {
                tracing::warn!(interview_id = %self.state.interview_id, "opening skipped the consent question");
                self.state.consent_followup_sent = true;
                self.state
                    .arm(TimerKind::ConsentPrompt, CONSENT_FALLBACK_DELAY, commands);
            }
        }

        if heuristics::is_closing_line(text) {
            tracing::info!(interview_id = %self.state.interview_id, "closing line detected: {}", preview(text, 120));
            self.mark_ended(commands);
        }
    }

    fn on_timer(&mut self, timer: TimerToken, commands: &mut Vec<Command>) {
        if !self.state.take_fired(timer) {
            tracing::debug!(?timer, "stale timer ignored");
            return;
        }
        match timer.kind {
            TimerKind::ConfigRetry => self.on_confirmation_timeout(commands),
            TimerKind::ConsentCheck => {
                if !self.state.consent_followup_sent {
                    self.state.consent_followup_sent = true;
                    self.send(consent_prompt(), commands);
                }
            }
            TimerKind::ConsentPrompt => self.send(consent_prompt(), commands),
        }
    }

    fn on_confirmation_timeout(&mut self, commands: &mut Vec<Command>) {
        if self.state.first_question_sent
            || self.state.session_ready_confirmed
            || !self.state.pending_initial_response
        {
            return;
        }
        if self.state.retry_count >= MAX_CONFIG_RETRIES {
            tracing::warn!(
                interview_id = %self.state.interview_id,
                "session.update not confirmed; holding initial response to prevent prompt drift"
            );
            self.state.degraded = true;
            if self.state.phase == Phase::AwaitingFirstQuestion {
                self.state.phase = Phase::Live;
            }
            return;
        }
        self.state.retry_count += 1;
        tracing::warn!(
            interview_id = %self.state.interview_id,
            retry = self.state.retry_count,
            "session.update not confirmed, retrying"
        );
        self.send_session_update(commands);
        self.queue_initial_response(commands);
    }

    fn on_pause(&mut self, commands: &mut Vec<Command>) {
        if self.state.phase != Phase::Live {
            return;
        }
        self.state.phase = Phase::Paused;
        self.state.disarm_all(commands);
        commands.push(Command::SetMicrophone(false));
    }

    fn on_resume(&mut self, commands: &mut Vec<Command>) {
        if self.state.phase != Phase::Paused {
            return;
        }
        self.state.phase = Phase::Live;
        if self.state.input_mode == InputMode::Voice {
            commands.push(Command::SetMicrophone(true));
        }
        if !self.state.session_ready_confirmed {
            tracing::warn!(interview_id = %self.state.interview_id, "session not confirmed; resume prompt withheld");
            return;
        }
        let instructions = resume_instructions(self.transcript.last_participant_answer());
        let config = ResponseConfig::new().with_instructions(&instructions);
        self.send(
            ClientEvent::ResponseCreate(ResponseCreateEvent::new().with_response(config)),
            commands,
        );
    }

    fn on_send_text(&mut self, text: &str, commands: &mut Vec<Command>) {
        if text.trim().is_empty() {
            return;
        }
        let create = ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(
            Item::Message(MessageItem::user_text(text)),
        ));
        if !self.state.channel_open {
            self.send(create, commands);
            return;
        }
        self.transcript.record_local_user_turn(text);
        self.send(create, commands);

        if self.state.session_ready_confirmed {
            self.send(
                ClientEvent::ResponseCreate(ResponseCreateEvent::new()),
                commands,
            );
        } else {
            tracing::warn!(
                interview_id = %self.state.interview_id,
                "response.create held until session is ready to prevent prompt drift"
            );
            self.queue_initial_response(commands);
        }
    }

    fn on_input_mode(&mut self, mode: InputMode, commands: &mut Vec<Command>) {
        self.state.input_mode = mode;
        if !self.state.channel_open {
            return;
        }
        let enabled = match mode {
            InputMode::Text => false,
            InputMode::Voice => self.state.phase != Phase::Paused,
        };
        commands.push(Command::SetMicrophone(enabled));
    }
}

//! Drives one [`InterviewSession`] against a live realtime channel.
//!
//! Inputs from the channel, the console, timers and signals are funnelled
//! through a single mpsc queue. Each input is handed to the controller and the
//! returned commands are executed in order before the next input is taken.

use crate::channel::RealtimeChannel;
use crate::timers::TimerScheduler;
use anyhow::{Context, Result, anyhow};
use lune_core::Command;
use lune_core::event::{self, InboundEvent};
use lune_core::session_state::{ControllerError, Input, InputMode, InterviewSession, Phase};
use lune_core::transcript::SnapshotTurn;
use openai_realtime::types::ServerEvent;
use openai_realtime::types::audio::Base64EncodedAudioBytes;
use openai_realtime::{ClientTx, ServerRx};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Time left for the closing line to play out before the channel is closed.
pub const CLOSING_GRACE: Duration = Duration::from_secs(3);

const AUDIO_DELTA_TYPES: [&str; 2] = ["response.output_audio.delta", "response.audio.delta"];

/// Whether captured audio may be sent upstream. Shared with the audio thread.
#[derive(Debug, Clone, Default)]
pub struct MicGate(Arc<AtomicBool>);

impl MicGate {
    pub fn set(&self, open: bool) {
        self.0.store(open, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A finished interview attempt as handed to export and finalize.
#[derive(Debug, Clone, PartialEq)]
pub struct EndedInterview {
    pub interview_id: String,
    pub turns: Vec<SnapshotTurn>,
    pub csv_path: Option<PathBuf>,
}

pub fn transcript_file_name(interview_id: &str) -> String {
    format!("chatgpt-enterprise-interview_{}.csv", interview_id)
}

/// Writes the CSV export for one interview into `dir`, creating it if needed.
pub async fn export_csv(dir: &Path, interview_id: &str, csv: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(transcript_file_name(interview_id));
    tokio::fs::write(&path, csv)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn audio_delta(message: &Value) -> Option<&str> {
    let kind = message.get("type").and_then(Value::as_str)?;
    if !AUDIO_DELTA_TYPES.contains(&kind) {
        return None;
    }
    message.get("delta").and_then(Value::as_str)
}

/// Forwards inbound realtime traffic into the runtime's input queue.
async fn pump(
    mut events: ServerRx,
    inputs: mpsc::Sender<Input>,
    playback: Option<mpsc::Sender<Base64EncodedAudioBytes>>,
) {
    loop {
        let input = match events.recv().await {
            Ok(ServerEvent::Message(message)) => {
                if let Some(delta) = audio_delta(&message) {
                    if let Some(playback) = playback.as_ref() {
                        if let Err(e) = playback.try_send(delta.to_string()) {
                            tracing::warn!("Failed to queue audio for playback: {}", e);
                        }
                    }
                    continue;
                }
                match event::classify(&message) {
                    InboundEvent::Irrelevant => continue,
                    inbound => Input::Server(inbound),
                }
            }
            Ok(ServerEvent::Close { reason }) => {
                tracing::info!("realtime channel closed by server: {:?}", reason);
                Input::ChannelClosed
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("dropped {} realtime events", skipped);
                continue;
            }
            Err(RecvError::Closed) => Input::ChannelClosed,
        };
        let closed = input == Input::ChannelClosed;
        if inputs.send(input).await.is_err() || closed {
            break;
        }
    }
}

/// Cloneable handle for feeding inputs to a running [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    inputs: mpsc::Sender<Input>,
}

impl RuntimeHandle {
    pub async fn send(&self, input: Input) -> Result<()> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| anyhow!("interview runtime has stopped"))
    }

    /// For threads outside the async runtime.
    pub fn blocking_send(&self, input: Input) -> Result<()> {
        self.inputs
            .blocking_send(input)
            .map_err(|_| anyhow!("interview runtime has stopped"))
    }
}

pub struct Runtime<C: RealtimeChannel> {
    session: InterviewSession,
    channel: C,
    mode: InputMode,
    timers: TimerScheduler,
    inputs_tx: mpsc::Sender<Input>,
    inputs_rx: mpsc::Receiver<Input>,
    mic: MicGate,
    outbound: watch::Sender<Option<ClientTx>>,
    playback: Option<mpsc::Sender<Base64EncodedAudioBytes>>,
    transcript_dir: PathBuf,
    pump: Option<JoinHandle<()>>,
    ended: Vec<EndedInterview>,
}

impl<C: RealtimeChannel> Runtime<C> {
    pub fn new(session: InterviewSession, channel: C, transcript_dir: impl Into<PathBuf>) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::channel(1024);
        let (outbound, _) = watch::channel(None);
        Self {
            session,
            channel,
            mode: InputMode::Voice,
            timers: TimerScheduler::new(inputs_tx.clone()),
            inputs_tx,
            inputs_rx,
            mic: MicGate::default(),
            outbound,
            playback: None,
            transcript_dir: transcript_dir.into(),
            pump: None,
            ended: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: InputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Interviewer audio deltas are forwarded here instead of being dropped.
    pub fn with_playback(mut self, playback: mpsc::Sender<Base64EncodedAudioBytes>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inputs: self.inputs_tx.clone(),
        }
    }

    pub fn mic_gate(&self) -> MicGate {
        self.mic.clone()
    }

    /// Follows the outbound sender of the currently open channel, if any.
    pub fn outbound(&self) -> watch::Receiver<Option<ClientTx>> {
        self.outbound.subscribe()
    }

    /// Starts an interview and runs until it has ended and the channel is closed.
    pub async fn run(mut self) -> Result<Vec<EndedInterview>> {
        self.dispatch(Input::Start).await;
        if self.mode == InputMode::Text {
            self.dispatch(Input::SetInputMode(InputMode::Text)).await;
        }

        while !self.finished() {
            let Some(input) = self.inputs_rx.recv().await else {
                break;
            };
            self.dispatch(input).await;
        }

        self.shutdown();
        if let Some(reason) = self.session.state().connect_error.clone() {
            return Err(anyhow!("failed to open realtime channel: {}", reason));
        }
        Ok(self.ended)
    }

    fn finished(&self) -> bool {
        let state = self.session.state();
        matches!(state.phase, Phase::Ended | Phase::Idle) && !state.channel_open
    }

    /// Feeds one input to the controller, plus any inputs its commands produce.
    async fn dispatch(&mut self, input: Input) {
        let mut pending = VecDeque::from([input]);
        while let Some(input) = pending.pop_front() {
            log_turn(&input);
            for command in self.session.handle(input) {
                if let Some(next) = self.execute(command).await {
                    pending.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Option<Input> {
        match command {
            Command::Connect => return Some(self.connect().await),
            Command::Send(event) => {
                let kind = event.kind();
                if let Err(e) = self.channel.send(event).await {
                    tracing::error!(event_type = kind, "failed to send event: {:#}", e);
                }
            }
            Command::SetMicrophone(enabled) => {
                tracing::info!(enabled, "microphone");
                self.mic.set(enabled);
            }
            Command::ReleaseMicrophone => {
                self.mic.set(false);
                self.outbound.send_replace(None);
            }
            Command::CloseChannel => {
                self.channel.close();
                self.outbound.send_replace(None);
                if let Some(pump) = self.pump.take() {
                    pump.abort();
                }
            }
            Command::Schedule { timer, after } => self.timers.schedule(timer, after),
            Command::Cancel(timer) => self.timers.cancel(timer),
            Command::InterviewEnded { interview_id } => self.on_interview_ended(interview_id).await,
            Command::Failed(ControllerError::ConnectFailed(reason)) => {
                tracing::error!("Could not start the interview: {}", reason);
            }
            Command::Failed(err) => tracing::warn!("{}", err),
        }
        None
    }

    async fn connect(&mut self) -> Input {
        match self.channel.open().await {
            Ok(events) => {
                if let Some(previous) = self.pump.take() {
                    previous.abort();
                }
                self.pump = Some(tokio::spawn(pump(
                    events,
                    self.inputs_tx.clone(),
                    self.playback.clone(),
                )));
                self.outbound.send_replace(self.channel.sender());
                Input::ChannelOpened
            }
            Err(e) => Input::ChannelFailed(format!("{:#}", e)),
        }
    }

    async fn on_interview_ended(&mut self, interview_id: String) {
        let transcript = self.session.transcript();
        let turns = transcript.downstream_snapshot();
        let csv = transcript.to_csv(&interview_id);

        let csv_path = match export_csv(&self.transcript_dir, &interview_id, &csv).await {
            Ok(path) => {
                tracing::info!(interview_id = %interview_id, "transcript exported to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::error!(interview_id = %interview_id, "transcript export failed: {:#}", e);
                None
            }
        };
        self.ended.push(EndedInterview {
            interview_id,
            turns,
            csv_path,
        });

        // The closing line ends the interview while the channel is still up.
        if self.session.state().channel_open {
            let inputs = self.inputs_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(CLOSING_GRACE).await;
                if inputs.send(Input::Stop).await.is_err() {
                    tracing::debug!("runtime already stopped");
                }
            });
        }
    }

    fn shutdown(&mut self) {
        self.timers.cancel_all();
        self.channel.close();
        self.outbound.send_replace(None);
        self.mic.set(false);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

fn log_turn(input: &Input) {
    match input {
        Input::Server(InboundEvent::AssistantDone { text, .. }) if !text.trim().is_empty() => {
            tracing::info!("Interviewer: {}", text.trim());
        }
        Input::Server(InboundEvent::UserTranscript { text, .. }) if !text.trim().is_empty() => {
            tracing::info!("Participant: {}", text.trim());
        }
        _ => {}
    }
}

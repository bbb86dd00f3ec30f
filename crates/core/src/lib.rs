pub mod event;
pub mod generator;
pub mod heuristics;
pub mod merge;
pub mod prompts;
pub mod report;
pub mod report_schema;
pub mod session_state;
pub mod store;
pub mod transcript;

use openai_realtime_types::ClientEvent;
use session_state::{ControllerError, TimerToken};
use std::time::Duration;

/// Side effects the interview controller asks its runtime to perform.
///
/// The controller never touches the network, the microphone or a clock
/// itself. It returns these values from every transition and the runtime
/// executes them in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the realtime channel.
    Connect,
    /// Deliver an event over the open channel.
    Send(ClientEvent),
    /// Enable or mute the outbound audio source.
    SetMicrophone(bool),
    /// Give the audio source back to the system.
    ReleaseMicrophone,
    CloseChannel,
    /// Fire `TimerFired(timer)` back into the controller after `after`.
    Schedule { timer: TimerToken, after: Duration },
    Cancel(TimerToken),
    /// Emitted exactly once per interview attempt.
    InterviewEnded { interview_id: String },
    Failed(ControllerError),
}

/// Shortens text for log lines.
pub(crate) fn preview(text: &str, max_chars: usize) -> &str {
    heuristics::truncate_chars(text.trim(), max_chars)
}

//! Line-based participant controls on stdin.

use crate::runtime::RuntimeHandle;
use lune_core::session_state::{Input, InputMode};
use std::io::BufRead;

pub const HELP: &str = "Commands: /pause, /resume, /stop, /voice, /text. Any other line is sent as a typed answer.";

/// Maps one line of console input to a controller input.
pub fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Input::SendText(line.to_string()));
    };
    match command.to_lowercase().as_str() {
        "pause" => Some(Input::Pause),
        "resume" => Some(Input::Resume),
        "stop" | "quit" | "end" => Some(Input::Stop),
        "voice" => Some(Input::SetInputMode(InputMode::Voice)),
        "text" => Some(Input::SetInputMode(InputMode::Text)),
        other => {
            tracing::warn!("unknown command '/{}'. {}", other, HELP);
            None
        }
    }
}

/// Reads stdin on a dedicated thread until EOF, which stops the interview.
pub fn spawn_stdin_reader(handle: RuntimeHandle) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut lines = std::io::stdin().lock().lines();
            loop {
                let input = match lines.next() {
                    Some(Ok(line)) => match parse_line(&line) {
                        Some(input) => input,
                        None => continue,
                    },
                    None => Input::Stop,
                    Some(Err(e)) => {
                        tracing::error!("Failed to read stdin: {}", e);
                        Input::Stop
                    }
                };
                let stop = input == Input::Stop;
                if handle.blocking_send(input).is_err() || stop {
                    break;
                }
            }
        })
}

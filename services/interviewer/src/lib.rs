pub mod channel;
pub mod config;
pub mod console;
pub mod finalize;
pub mod mcp;
pub mod runtime;
pub mod timers;
pub mod voice;

pub use runtime::{EndedInterview, MicGate, Runtime, RuntimeHandle};

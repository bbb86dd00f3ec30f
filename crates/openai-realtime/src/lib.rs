mod client;
pub mod secrets;

pub use client::{Client, ClientTx, Config, ConfigBuilder, ServerRx, UsageStats};
pub use client::connect_with_config;
pub use openai_realtime_types as types;

use crate::config::EVENT_CAPACITY;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use openai_realtime::secrets::{CLIENT_SECRETS_URL, mint_client_secret};
use openai_realtime::types::{ClientEvent, Session};
use openai_realtime::{ClientTx, ServerRx};
use secrecy::SecretString;

/// The realtime transport as the runtime sees it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RealtimeChannel: Send {
    /// Opens the channel and subscribes to its inbound events.
    async fn open(&mut self) -> Result<ServerRx>;

    async fn send(&mut self, event: ClientEvent) -> Result<()>;

    /// A handle other tasks can use while the channel is open.
    fn sender(&self) -> Option<ClientTx>;

    fn close(&mut self);
}

/// Connects to the OpenAI realtime endpoint with a freshly minted client
/// secret, so the long-lived key never rides on the socket.
pub struct OpenAiChannel {
    http: reqwest::Client,
    api_key: SecretString,
    secrets_url: String,
    model: String,
    session: Session,
    client: Option<openai_realtime::Client>,
}

impl OpenAiChannel {
    pub fn new(api_key: SecretString, session: Session, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            secrets_url: CLIENT_SECRETS_URL.to_string(),
            model: model.to_string(),
            session,
            client: None,
        }
    }

    async fn client_secret(&self) -> Result<String> {
        let minted = mint_client_secret(&self.http, &self.secrets_url, &self.api_key, &self.session)
            .await
            .context("Failed to request a realtime client secret")?;
        if !minted.is_success() {
            return Err(anyhow!(
                "client secret rejected ({}): {}",
                minted.status,
                minted.body
            ));
        }
        minted
            .value()
            .map(str::to_string)
            .context("No client secret in mint response")
    }
}

#[async_trait]
impl RealtimeChannel for OpenAiChannel {
    async fn open(&mut self) -> Result<ServerRx> {
        if let Some(mut stale) = self.client.take() {
            stale.close();
        }
        let secret = self.client_secret().await?;
        let config = openai_realtime::Config::builder()
            .with_api_key(&secret)
            .with_model(&self.model)
            .build();
        let client = openai_realtime::connect_with_config(EVENT_CAPACITY, config)
            .await
            .context("Failed to connect to OpenAI Realtime API")?;
        let events = client.server_events()?;
        self.client = Some(client);
        Ok(events)
    }

    async fn send(&mut self, event: ClientEvent) -> Result<()> {
        match self.client {
            Some(ref client) => client.send(event).await,
            None => Err(anyhow!("realtime channel is not open")),
        }
    }

    fn sender(&self) -> Option<ClientTx> {
        self.client.as_ref().and_then(|client| client.sender().ok())
    }

    fn close(&mut self) {
        let Some(mut client) = self.client.take() else {
            return;
        };
        if let Ok(usage) = client.stats() {
            tracing::info!(
                total_tokens = usage.total_tokens(),
                input_tokens = usage.input_tokens(),
                output_tokens = usage.output_tokens(),
                responses = usage.responses(),
                "realtime usage"
            );
        }
        client.close();
    }
}

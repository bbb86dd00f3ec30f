use lune_core::generator::ReportGenerator;
use lune_core::store::ReportStore;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Primary and fallback report models.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportModels {
    pub primary: String,
    pub fallback: String,
}

/// Upstream settings for minting realtime client secrets.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub http: reqwest::Client,
    pub url: String,
    pub api_key: Option<SecretString>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReportStore>,
    pub generator: Arc<dyn ReportGenerator>,
    pub models: ReportModels,
    pub token: TokenSettings,
    pub locks: InterviewLocks,
}

/// One async mutex per interview id.
///
/// Finalize and override updates do read-merge-write against the store and
/// must not interleave for the same id.
#[derive(Debug, Clone, Default)]
pub struct InterviewLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl InterviewLocks {
    pub async fn acquire(&self, interview_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            // Nobody else holds or waits on these.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(interview_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

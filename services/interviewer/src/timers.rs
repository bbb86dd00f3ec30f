use lune_core::session_state::{Input, TimerKind, TimerToken};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs the controller's timers on the tokio clock.
///
/// At most one task is armed per [`TimerKind`]. A fired timer comes back as
/// `Input::TimerFired` on the runtime's input channel.
pub struct TimerScheduler {
    inputs: mpsc::Sender<Input>,
    armed: HashMap<TimerKind, (u64, JoinHandle<()>)>,
}

impl TimerScheduler {
    pub fn new(inputs: mpsc::Sender<Input>) -> Self {
        Self {
            inputs,
            armed: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, timer: TimerToken, after: Duration) {
        let inputs = self.inputs.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if inputs.send(Input::TimerFired(timer)).await.is_err() {
                tracing::debug!(?timer, "runtime gone, timer dropped");
            }
        });
        if let Some((_, previous)) = self.armed.insert(timer.kind, (timer.generation, handle)) {
            previous.abort();
        }
    }

    /// Aborts the task for `timer` if it is still the armed generation.
    pub fn cancel(&mut self, timer: TimerToken) {
        let current = self
            .armed
            .get(&timer.kind)
            .is_some_and(|(generation, _)| *generation == timer.generation);
        if !current {
            return;
        }
        if let Some((_, handle)) = self.armed.remove(&timer.kind) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

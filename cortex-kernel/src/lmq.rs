//! Global request queue for the language-model port.
//!
//! Every planning call in the process goes through one `LmQueue`:
//! admission is priority-ordered (SURVIVAL first), rate-limited per
//! minute, retried with exponential backoff on transient errors, and
//! guarded by a circuit breaker that opens after consecutive failures
//! and half-opens after a cool-off.
//!
//! The wrapped client is swappable at runtime; the facade uses that for
//! soft resets of the planning layer.

use cortex_core::{ChatMessage, LanguageModel, LmError, LmPriority};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Tuning for [`LmQueue`].
#[derive(Debug, Clone)]
pub struct LmQueueConfig {
    /// Admissions per rolling minute.
    pub requests_per_minute: u32,
    /// Retries per call on retryable errors.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Consecutive failures that open the breaker.
    pub breaker_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub breaker_cooloff: Duration,
}

impl Default for LmQueueConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            breaker_threshold: 5,
            breaker_cooloff: Duration::from_secs(30),
        }
    }
}

struct LmqState {
    window: VecDeque<Instant>,
    waiting: Vec<(LmPriority, u64)>,
    next_seq: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_outstanding: bool,
}

enum CallKind {
    Chat,
    Coding,
}

/// Priority-ordered, rate-limited, circuit-broken language-model access.
pub struct LmQueue {
    model: Mutex<Arc<dyn LanguageModel>>,
    cfg: LmQueueConfig,
    state: Mutex<LmqState>,
    notify: Notify,
}

impl LmQueue {
    /// Wrap a client.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, cfg: LmQueueConfig) -> Self {
        Self {
            model: Mutex::new(model),
            cfg,
            state: Mutex::new(LmqState {
                window: VecDeque::new(),
                waiting: Vec::new(),
                next_seq: 0,
                consecutive_failures: 0,
                opened_at: None,
                probe_outstanding: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Replace the wrapped client. In-flight calls finish against the
    /// old one; the breaker and rate window are reset.
    pub fn swap_model(&self, model: Arc<dyn LanguageModel>) {
        *self.model.lock().unwrap() = model;
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.probe_outstanding = false;
        tracing::info!("language-model client swapped");
    }

    /// Whether the breaker is currently open.
    #[must_use]
    pub fn breaker_open(&self) -> bool {
        self.state.lock().unwrap().opened_at.is_some()
    }

    /// Queued chat call.
    pub async fn chat(
        &self,
        priority: LmPriority,
        messages: &[ChatMessage],
    ) -> Result<String, LmError> {
        self.call(CallKind::Chat, priority, messages).await
    }

    /// Queued coding call.
    pub async fn prompt_coding(
        &self,
        priority: LmPriority,
        messages: &[ChatMessage],
    ) -> Result<String, LmError> {
        self.call(CallKind::Coding, priority, messages).await
    }

    async fn call(
        &self,
        kind: CallKind,
        priority: LmPriority,
        messages: &[ChatMessage],
    ) -> Result<String, LmError> {
        let mut attempt: u32 = 0;
        loop {
            let probing = self.breaker_gate()?;
            self.acquire_slot(priority).await;

            let model = Arc::clone(&*self.model.lock().unwrap());
            let result = match kind {
                CallKind::Chat => model.chat(messages).await,
                CallKind::Coding => model.prompt_coding(messages).await,
            };

            match result {
                Ok(text) => {
                    self.record_success();
                    return Ok(text);
                }
                Err(e) => {
                    self.record_failure(probing);
                    if e.is_retryable() && attempt < self.cfg.max_retries {
                        let delay = self
                            .cfg
                            .base_delay
                            .saturating_mul(1u32 << attempt.min(16))
                            .min(self.cfg.max_delay);
                        tracing::debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "language-model call failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Check the breaker. Returns whether this call is the half-open
    /// probe.
    fn breaker_gate(&self) -> Result<bool, LmError> {
        let mut state = self.state.lock().unwrap();
        match state.opened_at {
            None => Ok(false),
            Some(at) => {
                if at.elapsed() >= self.cfg.breaker_cooloff && !state.probe_outstanding {
                    state.probe_outstanding = true;
                    tracing::info!("language-model breaker half-open, probing");
                    Ok(true)
                } else {
                    Err(LmError::CircuitOpen)
                }
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.probe_outstanding = false;
    }

    fn record_failure(&self, probing: bool) {
        let mut state = self.state.lock().unwrap();
        if probing {
            // The probe failed: restart the cool-off.
            state.opened_at = Some(Instant::now());
            state.probe_outstanding = false;
            return;
        }
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.cfg.breaker_threshold && state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = state.consecutive_failures,
                "language-model breaker opened"
            );
        }
    }

    /// Wait for a rate-limit slot, served in (priority, FIFO) order.
    async fn acquire_slot(&self, priority: LmPriority) {
        let seq = {
            let mut state = self.state.lock().unwrap();
            state.next_seq += 1;
            let seq = state.next_seq;
            state.waiting.push((priority, seq));
            seq
        };
        loop {
            let wait_until = {
                let mut state = self.state.lock().unwrap();
                let horizon = Instant::now().checked_sub(Duration::from_secs(60));
                if let Some(horizon) = horizon {
                    while state.window.front().is_some_and(|t| *t <= horizon) {
                        state.window.pop_front();
                    }
                }
                let head = state
                    .waiting
                    .iter()
                    .max_by_key(|(p, s)| (*p, std::cmp::Reverse(*s)))
                    .map(|(_, s)| *s);
                if (state.window.len() as u32) < self.cfg.requests_per_minute
                    && head == Some(seq)
                {
                    state.waiting.retain(|(_, s)| *s != seq);
                    state.window.push_back(Instant::now());
                    drop(state);
                    // More slots may remain for the next waiter.
                    self.notify.notify_waiters();
                    return;
                }
                state
                    .window
                    .front()
                    .map(|t| *t + Duration::from_secs(60))
            };
            match wait_until {
                Some(t) => {
                    tokio::select! {
                        () = self.notify.notified() => {}
                        () = tokio::time::sleep_until(t) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }
}

#[async_trait]
impl LanguageModel for LmQueue {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LmError> {
        LmQueue::chat(self, LmPriority::Normal, messages).await
    }

    async fn prompt_coding(&self, messages: &[ChatMessage]) -> Result<String, LmError> {
        LmQueue::prompt_coding(self, LmPriority::Normal, messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::test_utils::ScriptedModel;

    fn fast_cfg() -> LmQueueConfig {
        LmQueueConfig {
            requests_per_minute: 100,
            max_retries: 0,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            breaker_threshold: 5,
            breaker_cooloff: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn successful_call_passes_through() {
        let model = Arc::new(ScriptedModel::new());
        model.push_chat("hello");
        let queue = LmQueue::new(model, fast_cfg());
        let out = queue
            .chat(LmPriority::Normal, &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_after_threshold_and_half_opens() {
        let model = Arc::new(ScriptedModel::new());
        let queue = LmQueue::new(Arc::clone(&model) as Arc<dyn LanguageModel>, fast_cfg());
        let msgs = [ChatMessage::user("q")];

        // Five consecutive failures (empty script) open the breaker.
        for _ in 0..5 {
            assert!(queue.chat(LmPriority::Normal, &msgs).await.is_err());
        }
        assert!(queue.breaker_open());
        assert_eq!(model.chat_calls(), 5);

        // While open, calls fail fast without touching the client.
        assert!(matches!(
            queue.chat(LmPriority::Normal, &msgs).await,
            Err(LmError::CircuitOpen)
        ));
        assert_eq!(model.chat_calls(), 5);

        // After the cool-off one probe goes through; success closes.
        tokio::time::advance(Duration::from_secs(31)).await;
        model.push_chat("recovered");
        let out = queue.chat(LmPriority::Normal, &msgs).await.unwrap();
        assert_eq!(out, "recovered");
        assert!(!queue.breaker_open());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_defers_excess_calls() {
        let model = Arc::new(ScriptedModel::new());
        for _ in 0..3 {
            model.push_chat("ok");
        }
        let cfg = LmQueueConfig {
            requests_per_minute: 2,
            ..fast_cfg()
        };
        let queue = LmQueue::new(model, cfg);
        let msgs = [ChatMessage::user("q")];

        let start = Instant::now();
        queue.chat(LmPriority::Normal, &msgs).await.unwrap();
        queue.chat(LmPriority::Normal, &msgs).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        // Third call must wait for the window to roll.
        queue.chat(LmPriority::Normal, &msgs).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn swap_model_resets_breaker() {
        let dead = Arc::new(ScriptedModel::new());
        let queue = LmQueue::new(dead, fast_cfg());
        let msgs = [ChatMessage::user("q")];
        for _ in 0..5 {
            let _ = queue.chat(LmPriority::Normal, &msgs).await;
        }
        assert!(queue.breaker_open());

        let fresh = Arc::new(ScriptedModel::new());
        fresh.push_chat("alive");
        queue.swap_model(fresh);
        assert!(!queue.breaker_open());
        assert_eq!(
            queue.chat(LmPriority::Normal, &msgs).await.unwrap(),
            "alive"
        );
    }
}

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::relay::types::{CaptureResult, ChannelId};

use super::AuthProvider;

/// Build a capture result whose segment URLs end in the given filenames.
pub fn capture_of(names: &[&str]) -> CaptureResult {
    CaptureResult {
        auth_url: "https://upstream.example/auth/test.m3u8".to_string(),
        playlist_body: None,
        segments: names
            .iter()
            .map(|n| format!("https://upstream.example/hls/{}", n))
            .collect(),
    }
}

/**
    Scriptable in-memory AuthProvider for tests.

    Counts calls and tracks the peak number of concurrent captures. Scripted
    responses (pushed with `push_ok`) are consumed first; once the queue is
    empty the fallback response repeats.
*/
pub struct MockProvider {
    calls: AtomicUsize,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
    delay: Duration,
    queue: Mutex<VecDeque<Result<CaptureResult, String>>>,
    fallback: Mutex<Result<CaptureResult, String>>,
}

impl MockProvider {
    /// Provider that always succeeds with the given segment filenames.
    pub fn ok(names: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
            max_inflight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(capture_of(names))),
        }
    }

    /// Provider that always fails.
    pub fn failing(message: &str) -> Self {
        let provider = Self::ok(&[]);
        provider.fail_from_now_on(message);
        provider
    }

    /// Make every capture take this long (to widen race windows in tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a one-shot successful response.
    pub fn push_ok(&self, names: &[&str]) {
        self.queue.lock().unwrap().push_back(Ok(capture_of(names)));
    }

    /// Replace the fallback so all further captures fail.
    pub fn fail_from_now_on(&self, message: &str) {
        *self.fallback.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for MockProvider {
    async fn capture(&self, _id: &ChannelId) -> Result<CaptureResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inflight.fetch_sub(1, Ordering::SeqCst);

        let next = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        next.map_err(|e| anyhow!(e))
    }
}

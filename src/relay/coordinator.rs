use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::capture::AuthProvider;
use crate::util;

use super::store::SessionStore;
use super::types::{ChannelId, ChannelSession, RefreshState};

/// Extra slack given to waiters beyond the capture timeout.
const WAIT_SLACK: Duration = Duration::from_secs(2);

/// A session handed back to a caller. `stale` marks a degraded fallback:
/// the capture failed and this is the last good session, older than the
/// caller's freshness bound.
#[derive(Debug, Clone)]
pub struct ServedSession {
    pub session: ChannelSession,
    pub stale: bool,
}

impl ServedSession {
    fn fresh(session: ChannelSession) -> Self {
        Self {
            session,
            stale: false,
        }
    }

    fn stale(session: ChannelSession) -> Self {
        Self {
            session,
            stale: true,
        }
    }
}

/**
    Decides whether a channel's session is usable for a caller's freshness
    requirement, and runs the capture when it is not.

    At most one capture per channel is in flight at any time: concurrent
    callers for the same channel wait for that capture's result instead of
    starting their own (single-flight, modeled as a store-side marker plus
    notify).
*/
pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    provider: Arc<dyn AuthProvider>,
    capture_timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn AuthProvider>,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            capture_timeout,
        }
    }

    /**
        Return a session no older than `max_age`, capturing if needed.

        On capture failure an earlier (now stale) session is returned as a
        degraded fallback, flagged via `ServedSession::stale`; an error
        surfaces only when the channel has never had a successful capture.
    */
    pub async fn ensure_fresh(&self, id: &ChannelId, max_age: Duration) -> Result<ServedSession> {
        if let Some(session) = self.fresh_session(id, max_age) {
            return Ok(ServedSession::fresh(session));
        }
        self.refresh(id, Some(max_age)).await
    }

    /**
        Re-capture regardless of the current session's age (segment resolver
        step when a requested segment is no longer listed). Concurrent
        forcers still coalesce into a single capture.
    */
    pub async fn force_refresh(&self, id: &ChannelId) -> Result<ServedSession> {
        self.refresh(id, None).await
    }

    fn fresh_session(&self, id: &ChannelId, max_age: Duration) -> Option<ChannelSession> {
        self.store
            .session(id)
            .filter(|session| session.age(util::time::now()) <= max_age)
    }

    async fn refresh(&self, id: &ChannelId, max_age: Option<Duration>) -> Result<ServedSession> {
        if !self.store.try_mark_refreshing(id) {
            return self.wait_for_winner(id).await;
        }

        // Another caller may have finished a capture between this caller's
        // staleness check and winning the marker.
        if let Some(max_age) = max_age
            && let Some(session) = self.fresh_session(id, max_age)
        {
            self.store.finish_refresh(id, None);
            return Ok(ServedSession::fresh(session));
        }

        match self.run_capture(id).await {
            Ok(session) => {
                self.store.finish_refresh(id, None);
                Ok(ServedSession::fresh(session))
            }
            Err(e) => {
                self.store.finish_refresh(id, Some(e.to_string()));
                match self.store.session(id) {
                    Some(stale) => {
                        eprintln!(
                            "[coordinator] Capture failed for channel {}: {}. Serving stale session ({}s old)",
                            id,
                            e,
                            stale.age(util::time::now()).as_secs()
                        );
                        Ok(ServedSession::stale(stale))
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn run_capture(&self, id: &ChannelId) -> Result<ChannelSession> {
        let capture = tokio::time::timeout(self.capture_timeout, self.provider.capture(id))
            .await
            .map_err(|_| anyhow!("Capture timed out for channel {}", id))??;

        let session = ChannelSession::new(capture, util::time::now());
        self.store.replace_session(id, session.clone());
        Ok(session)
    }

    /// Wait for another caller's in-flight capture and read its outcome.
    async fn wait_for_winner(&self, id: &ChannelId) -> Result<ServedSession> {
        let timeout = self.capture_timeout + WAIT_SLACK;
        match self.store.wait_for_refresh(id, timeout).await {
            RefreshState::Refreshing => Err(anyhow!(
                "Timed out waiting for capture of channel {}",
                id
            )),
            RefreshState::Idle => self
                .store
                .session(id)
                .map(ServedSession::fresh)
                .ok_or_else(|| {
                    anyhow!("Capture finished but no session exists for channel {}", id)
                }),
            RefreshState::Failed(err) => match self.store.session(id) {
                Some(stale) => Ok(ServedSession::stale(stale)),
                None => Err(anyhow!("Capture failed for channel {}: {}", id, err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::MockProvider;

    fn coordinator(provider: Arc<MockProvider>) -> RefreshCoordinator {
        RefreshCoordinator::new(
            Arc::new(SessionStore::new()),
            provider,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_fresh_session_not_recaptured() {
        let provider = Arc::new(MockProvider::ok(&["42_1.ts"]));
        let coordinator = coordinator(Arc::clone(&provider));
        let id = ChannelId::new("42");

        coordinator
            .ensure_fresh(&id, Duration::from_secs(10))
            .await
            .unwrap();
        coordinator
            .ensure_fresh(&id, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_returned_session_within_max_age() {
        let provider = Arc::new(MockProvider::ok(&["42_1.ts"]));
        let coordinator = coordinator(provider);
        let id = ChannelId::new("42");
        let max_age = Duration::from_secs(10);

        let served = coordinator.ensure_fresh(&id, max_age).await.unwrap();
        assert!(served.session.age(util::time::now()) <= max_age);
        assert!(!served.stale);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_capture() {
        let provider =
            Arc::new(MockProvider::ok(&["42_1.ts"]).with_delay(Duration::from_millis(100)));
        let coordinator = Arc::new(coordinator(Arc::clone(&provider)));
        let id = ChannelId::new("42");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                coordinator.ensure_fresh(&id, Duration::from_secs(10)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_capture_failure() {
        let provider = Arc::new(MockProvider::ok(&["42_1.ts"]));
        let coordinator = coordinator(Arc::clone(&provider));
        let id = ChannelId::new("42");

        let first = coordinator
            .ensure_fresh(&id, Duration::from_secs(10))
            .await
            .unwrap();

        provider.fail_from_now_on("upstream down");
        tokio::time::sleep(Duration::from_millis(10)).await;

        let fallback = coordinator
            .ensure_fresh(&id, Duration::from_millis(1))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(fallback.session.captured_at, first.session.captured_at);
        assert!(!first.stale);
        assert!(fallback.stale);
    }

    #[tokio::test]
    async fn test_error_when_channel_never_succeeded() {
        let provider = Arc::new(MockProvider::failing("no token"));
        let coordinator = coordinator(provider);
        let id = ChannelId::new("42");

        let result = coordinator.ensure_fresh(&id, Duration::from_secs(10)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refresh_winner_rechecks_freshness() {
        let provider = Arc::new(MockProvider::ok(&["42_1.ts"]));
        let store = Arc::new(SessionStore::new());
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&provider) as Arc<dyn AuthProvider>,
            Duration::from_secs(5),
        );
        let id = ChannelId::new("42");

        // Simulate a capture that completed between a caller's staleness
        // check and that caller winning the refresh marker.
        store.replace_session(
            &id,
            ChannelSession::new(
                crate::capture::testing::capture_of(&["42_1.ts"]),
                util::time::now(),
            ),
        );

        let served = coordinator
            .refresh(&id, Some(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 0);
        assert!(!served.stale);
        // The marker was released for the next refresher.
        assert!(store.try_mark_refreshing(&id));
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_freshness() {
        let provider = Arc::new(MockProvider::ok(&["42_1.ts"]));
        let coordinator = coordinator(Arc::clone(&provider));
        let id = ChannelId::new("42");

        coordinator
            .ensure_fresh(&id, Duration::from_secs(10))
            .await
            .unwrap();
        coordinator.force_refresh(&id).await.unwrap();

        assert_eq!(provider.calls(), 2);
    }
}

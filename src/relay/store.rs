use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use super::types::{ChannelId, ChannelSession, RefreshState};

/**
    In-memory table of per-channel sessions, shared by the request handlers,
    the refresh coordinator and the background warmer.

    All maps use short critical sections; no lock is held across an await.
    Waiters on an in-flight capture park on a per-channel `Notify`.
*/
pub struct SessionStore {
    sessions: RwLock<HashMap<ChannelId, ChannelSession>>,
    refresh_state: RwLock<HashMap<ChannelId, RefreshState>>,
    refresh_notify: RwLock<HashMap<ChannelId, Arc<Notify>>>,
    /// Channels with recent viewer traffic, keyed by last activity time.
    active: RwLock<HashMap<ChannelId, DateTime<Utc>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            refresh_state: RwLock::new(HashMap::new()),
            refresh_notify: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
        }
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    pub fn session(&self, id: &ChannelId) -> Option<ChannelSession> {
        self.sessions.read().unwrap().get(id).cloned()
    }

    /**
        Replace a channel's session wholesale.

        `captured_at` is monotonic per channel: if the incoming session is
        older than the stored one (a slow capture losing to a faster one),
        the stored session wins.
    */
    pub fn replace_session(&self, id: &ChannelId, session: ChannelSession) {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get(id) {
            Some(existing) if existing.captured_at > session.captured_at => {}
            _ => {
                sessions.insert(id.clone(), session);
            }
        }
    }

    pub fn evict(&self, id: &ChannelId) {
        self.sessions.write().unwrap().remove(id);
        self.drop_refresh_entries(id);
    }

    /// Channels that currently hold a session, sorted for stable output.
    pub fn live_channels(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.sessions.read().unwrap().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    // ── Refresh state (single-flight marker) ─────────────────────────────

    pub fn refresh_state(&self, id: &ChannelId) -> RefreshState {
        self.refresh_state
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or(RefreshState::Idle)
    }

    /**
        Try to become the channel's refresher.
        Returns `true` if this caller won the race and must run the capture.
        Returns `false` if a capture is already in flight.
    */
    pub fn try_mark_refreshing(&self, id: &ChannelId) -> bool {
        let mut states = self.refresh_state.write().unwrap();
        match states.get(id) {
            Some(RefreshState::Refreshing) => false,
            _ => {
                states.insert(id.clone(), RefreshState::Refreshing);

                let mut notifies = self.refresh_notify.write().unwrap();
                notifies
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Notify::new()));

                true
            }
        }
    }

    /**
        Record the outcome of an in-flight capture and wake all waiters.
        A successful capture must `replace_session` before calling this.
    */
    pub fn finish_refresh(&self, id: &ChannelId, error: Option<String>) {
        {
            let mut states = self.refresh_state.write().unwrap();
            let state = match error {
                None => RefreshState::Idle,
                Some(err) => RefreshState::Failed(err),
            };
            states.insert(id.clone(), state);
        }
        let notifies = self.refresh_notify.read().unwrap();
        if let Some(notify) = notifies.get(id) {
            notify.notify_waiters();
        }
    }

    /**
        Drop a channel's refresh-state and notify entries. Skipped while a
        capture is in flight: its waiters still need the notify, and
        `finish_refresh` will re-insert the state anyway.
    */
    fn drop_refresh_entries(&self, id: &ChannelId) {
        let mut states = self.refresh_state.write().unwrap();
        if matches!(states.get(id), Some(RefreshState::Refreshing)) {
            return;
        }
        states.remove(id);
        self.refresh_notify.write().unwrap().remove(id);
    }

    /**
        Wait for the channel's in-flight capture to finish (with timeout).
        Returns the final state; still `Refreshing` means the wait timed out.
    */
    pub async fn wait_for_refresh(&self, id: &ChannelId, timeout: Duration) -> RefreshState {
        let current = self.refresh_state(id);
        if !current.is_refreshing() {
            return current;
        }

        let notify = {
            let notifies = self.refresh_notify.read().unwrap();
            notifies.get(id).cloned()
        };

        let Some(notify) = notify else {
            return current;
        };

        let result = tokio::time::timeout(timeout, async {
            loop {
                notify.notified().await;
                let state = self.refresh_state(id);
                if !state.is_refreshing() {
                    return state;
                }
            }
        })
        .await;

        match result {
            Ok(state) => state,
            Err(_timeout) => self.refresh_state(id),
        }
    }

    // ── Active set ───────────────────────────────────────────────────────

    /// Record viewer activity for a channel.
    pub fn mark_active(&self, id: &ChannelId) {
        let mut active = self.active.write().unwrap();
        active.insert(id.clone(), crate::util::time::now());
    }

    pub fn is_active(&self, id: &ChannelId) -> bool {
        self.active.read().unwrap().contains_key(id)
    }

    /// Channels with viewer traffic inside the activity window, sorted.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.active.read().unwrap().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /**
        Drop active-set entries without viewer traffic for `window`.
        Returns the removed channel ids.
    */
    pub fn sweep_inactive(&self, window: Duration) -> Vec<ChannelId> {
        let now = crate::util::time::now();
        let mut active = self.active.write().unwrap();
        let stale: Vec<ChannelId> = active
            .iter()
            .filter(|(_, last_seen)| {
                (now - **last_seen).to_std().unwrap_or(Duration::ZERO) > window
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            active.remove(id);
        }
        stale
    }

    /**
        Evict sessions of channels that are neither seeded nor active and
        whose capture is older than `evict_after`. Bounds memory growth from
        one-off viewer requests. Returns the evicted channel ids.
    */
    pub fn evict_idle_sessions(&self, seed: &[ChannelId], evict_after: Duration) -> Vec<ChannelId> {
        let now = crate::util::time::now();
        let idle: Vec<ChannelId> = {
            let active = self.active.read().unwrap();
            let mut sessions = self.sessions.write().unwrap();
            let idle: Vec<ChannelId> = sessions
                .iter()
                .filter(|(id, session)| {
                    !seed.contains(*id)
                        && !active.contains_key(*id)
                        && session.age(now) > evict_after
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in &idle {
                sessions.remove(id);
            }
            idle
        };
        for id in &idle {
            self.drop_refresh_entries(id);
        }
        idle
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::types::CaptureResult;
    use chrono::Duration as ChronoDuration;

    fn session_at(captured_at: DateTime<Utc>) -> ChannelSession {
        ChannelSession::new(
            CaptureResult {
                auth_url: "https://upstream.example/auth/1.m3u8".to_string(),
                playlist_body: None,
                segments: Vec::new(),
            },
            captured_at,
        )
    }

    #[test]
    fn test_replace_session_keeps_newer() {
        let store = SessionStore::new();
        let id = ChannelId::new("42");
        let now = crate::util::time::now();

        store.replace_session(&id, session_at(now));
        store.replace_session(&id, session_at(now - ChronoDuration::seconds(30)));

        let session = store.session(&id).unwrap();
        assert_eq!(session.captured_at, now);
    }

    #[test]
    fn test_single_flight_marker() {
        let store = SessionStore::new();
        let id = ChannelId::new("42");

        assert!(store.try_mark_refreshing(&id));
        assert!(!store.try_mark_refreshing(&id));

        store.finish_refresh(&id, None);
        assert!(store.try_mark_refreshing(&id));
    }

    #[test]
    fn test_evict_idle_sessions_spares_seed_and_active() {
        let store = SessionStore::new();
        let seed = ChannelId::new("1");
        let active = ChannelId::new("2");
        let idle = ChannelId::new("3");
        let old = crate::util::time::now() - ChronoDuration::seconds(600);

        for id in [&seed, &active, &idle] {
            store.replace_session(id, session_at(old));
        }
        store.mark_active(&active);

        let evicted = store.evict_idle_sessions(&[seed.clone()], Duration::from_secs(300));
        assert_eq!(evicted, vec![idle.clone()]);
        assert!(store.session(&seed).is_some());
        assert!(store.session(&active).is_some());
        assert!(store.session(&idle).is_none());
    }

    #[test]
    fn test_eviction_drops_refresh_bookkeeping() {
        let store = SessionStore::new();
        let id = ChannelId::new("9");
        let old = crate::util::time::now() - ChronoDuration::seconds(600);

        store.replace_session(&id, session_at(old));
        assert!(store.try_mark_refreshing(&id));
        store.finish_refresh(&id, Some("boom".to_string()));

        let evicted = store.evict_idle_sessions(&[], Duration::from_secs(300));
        assert_eq!(evicted, vec![id.clone()]);
        // The failure record went with the session; nothing lingers for a
        // channel nobody watches.
        assert!(matches!(store.refresh_state(&id), RefreshState::Idle));
    }

    #[test]
    fn test_evict_keeps_in_flight_refresh_marker() {
        let store = SessionStore::new();
        let id = ChannelId::new("9");

        store.replace_session(&id, session_at(crate::util::time::now()));
        assert!(store.try_mark_refreshing(&id));

        store.evict(&id);
        assert!(store.session(&id).is_none());
        // Waiters on the in-flight capture keep their marker and notify.
        assert!(store.refresh_state(&id).is_refreshing());

        store.finish_refresh(&id, None);
        store.evict(&id);
        assert!(matches!(store.refresh_state(&id), RefreshState::Idle));
    }

    #[test]
    fn test_sweep_inactive_window() {
        let store = SessionStore::new();
        let id = ChannelId::new("7");
        store.mark_active(&id);

        assert!(store.sweep_inactive(Duration::from_secs(60)).is_empty());
        assert!(store.is_active(&id));

        std::thread::sleep(Duration::from_millis(5));
        let removed = store.sweep_inactive(Duration::from_millis(1));
        assert_eq!(removed, vec![id.clone()]);
        assert!(!store.is_active(&id));
    }
}

//! Session registry and correlator.
//!
//! The single shared structure in the process: a lookup table from session
//! key to the actor serving it. Lookups hold the map entry only for the
//! duration of the lookup-or-create; everything stateful happens inside the
//! actors.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tether_core::errors::SelectionError;
use tether_core::events::HookEvent;
use tether_core::ids::{InteractionHandle, SessionKey};

use crate::machine::{self, SessionCommand, SessionConfig, SessionHandle};

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Sessions with no activity for this long are evicted, unless a
    /// permission request is still outstanding.
    pub idle_timeout: Duration,
    /// How often the eviction sweep runs.
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Registry of live sessions, keyed by working-directory tag.
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, SessionHandle>,
    session_config: SessionConfig,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(session_config: SessionConfig, config: RegistryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            session_config,
            config,
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Look up or lazily create the session for a key, returning its inbox.
    fn resolve(&self, key: &SessionKey) -> mpsc::Sender<SessionCommand> {
        if let Some(handle) = self.sessions.get(key) {
            return handle.tx.clone();
        }
        let tx = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| machine::spawn(key.clone(), self.session_config.clone()))
            .tx
            .clone();
        self.record_active();
        tx
    }

    fn record_active(&self) {
        self.session_config
            .metrics
            .gauge_set("sessions.active", &[], self.sessions.len() as f64);
    }

    /// Route one intake event to its session, creating the session when the
    /// working-directory tag is new.
    pub async fn dispatch_event(&self, event: HookEvent) {
        let key = SessionKey::from_cwd(&event.cwd);
        let tx = self.resolve(&key);
        if tx.send(SessionCommand::Event(event)).await.is_err() {
            // The actor died between lookup and send; drop the stale entry
            // so the next event recreates it.
            warn!(session = %key, "session inbox closed, removing entry");
            self.sessions.remove(&key);
        }
    }

    /// Route an inbound user message. The session is keyed by the pane's
    /// current working directory, so chat and hook events about the same
    /// agent land in the same session.
    pub async fn dispatch_chat(&self, text: String) -> Result<(), SelectionError> {
        let cwd = self
            .session_config
            .transport
            .pane_cwd(&self.session_config.target)
            .await
            .map_err(|e| SelectionError::UnknownSession(e.to_string()))?;
        let key = SessionKey::from_cwd(&cwd);
        let tx = self.resolve(&key);
        tx.send(SessionCommand::Chat { text })
            .await
            .map_err(|_| SelectionError::UnknownSession(key.to_string()))
    }

    /// Apply a user's option selection to the session that presented it.
    pub async fn handle_selection(
        &self,
        key: &SessionKey,
        interaction: InteractionHandle,
        index: usize,
    ) -> Result<(), SelectionError> {
        let Some(handle) = self.sessions.get(key) else {
            return Err(SelectionError::UnknownSession(key.to_string()));
        };
        let tx = handle.tx.clone();
        drop(handle);

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(SessionCommand::Select {
            interaction,
            index,
            reply: reply_tx,
        })
        .await
        .map_err(|_| SelectionError::UnknownSession(key.to_string()))?;
        reply_rx
            .await
            .map_err(|_| SelectionError::UnknownSession(key.to_string()))?
    }

    /// Evict sessions idle past the timeout. Sessions holding an unanswered
    /// permission request are skipped so the dialog stays answerable.
    pub fn evict_idle(&self) -> usize {
        let cutoff = self.config.idle_timeout.as_secs();
        let now = now_secs();
        let stale: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let handle = entry.value();
                if handle.has_pending_permission.load(Ordering::Relaxed) {
                    return None;
                }
                let last = handle.last_activity.load(Ordering::Relaxed);
                if now.saturating_sub(last) > cutoff {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();

        let mut removed = 0;
        for key in stale {
            if let Some((_, handle)) = self.sessions.remove(&key) {
                handle.abort();
                removed += 1;
                info!(session = %key, "idle session evicted");
            }
        }
        if removed > 0 {
            self.record_active();
        }
        removed
    }

    /// Drop every session. Used at shutdown.
    pub fn teardown(&self) {
        for entry in self.sessions.iter() {
            entry.value().abort();
        }
        self.sessions.clear();
        self.record_active();
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Consume intake events and route them to sessions. The only synchronized
/// step between intake and a session actor.
pub fn start_dispatcher(
    registry: Arc<SessionRegistry>,
    mut events: mpsc::Receiver<HookEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(kind = event.kind.label(), cwd = %event.cwd, "dispatching event");
            registry.dispatch_event(event).await;
        }
        info!("event dispatcher stopped");
    })
}

/// Periodic idle-eviction sweep.
pub fn start_eviction_sweep(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    let interval = registry.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume first immediate tick
        loop {
            ticker.tick().await;
            let removed = registry.evict_idle();
            if removed > 0 {
                info!(removed, "idle session sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::PermissionConfig;
    use crate::testing::{MockTransport, RecordingSink, SinkCall};
    use chrono::Utc;
    use std::sync::Arc;
    use tether_core::events::EventKind;
    use tether_mux::PaneTarget;
    use tether_telemetry::MetricsRecorder;

    struct Fixture {
        registry: Arc<SessionRegistry>,
        sink: Arc<RecordingSink>,
        transport: Arc<MockTransport>,
    }

    fn fixture(registry_config: RegistryConfig) -> Fixture {
        let sink = Arc::new(RecordingSink::new());
        let transport = Arc::new(MockTransport::new());
        let session_config = SessionConfig {
            sink: sink.clone(),
            transport: transport.clone(),
            target: PaneTarget::new("main", 0, 0),
            permission: PermissionConfig {
                timeout: Duration::from_secs(60),
                scrape_window: Duration::from_millis(20),
                scrape_interval: Duration::from_millis(5),
                capture_lines: 10,
            },
            metrics: Arc::new(MetricsRecorder::new()),
            inbox_capacity: 64,
        };
        Fixture {
            registry: Arc::new(SessionRegistry::new(session_config, registry_config)),
            sink,
            transport,
        }
    }

    fn final_event(cwd: &str, text: &str) -> HookEvent {
        HookEvent {
            kind: EventKind::AssistantFinal { text: text.into() },
            cwd: cwd.into(),
            session_id: None,
            received_at: Utc::now(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn events_for_distinct_cwds_get_distinct_sessions() {
        let f = fixture(RegistryConfig::default());
        f.registry.dispatch_event(final_event("/a", "one")).await;
        f.registry.dispatch_event(final_event("/b", "two")).await;
        settle().await;
        assert_eq!(f.registry.count(), 2);
    }

    #[tokio::test]
    async fn trailing_slash_maps_to_the_same_session() {
        let f = fixture(RegistryConfig::default());
        f.registry.dispatch_event(final_event("/a", "one")).await;
        f.registry.dispatch_event(final_event("/a/", "two")).await;
        settle().await;
        assert_eq!(f.registry.count(), 1);
    }

    #[tokio::test]
    async fn chat_resolves_session_by_pane_cwd() {
        let f = fixture(RegistryConfig::default());
        f.transport.set_cwd("/work/project");
        f.registry.dispatch_chat("hello".into()).await.unwrap();
        settle().await;

        assert_eq!(f.registry.count(), 1);
        assert_eq!(f.transport.injects(), vec!["hello".to_string()]);

        // A later event from the same directory joins the chat's session.
        f.registry
            .dispatch_event(final_event("/work/project", "done"))
            .await;
        settle().await;
        assert_eq!(f.registry.count(), 1);
        let calls = f.sink.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, SinkCall::Create { text, .. } if text == "done")));
    }

    #[tokio::test]
    async fn selection_on_unknown_session_is_rejected() {
        let f = fixture(RegistryConfig::default());
        let result = f
            .registry
            .handle_selection(
                &SessionKey::from_cwd("/nowhere"),
                InteractionHandle::from_raw("x"),
                0,
            )
            .await;
        assert!(matches!(result, Err(SelectionError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn selection_routes_to_the_session_actor() {
        let f = fixture(RegistryConfig::default());
        f.registry
            .dispatch_event(HookEvent {
                kind: EventKind::PermissionRequest {
                    prompt: "Allow?".into(),
                    options: vec!["Yes".into(), "No".into()],
                    raw_options: None,
                },
                cwd: "/work".into(),
                session_id: None,
                received_at: Utc::now(),
            })
            .await;
        settle().await;

        let interaction = f.sink.presented_options()[0].1.clone();
        let key = SessionKey::from_cwd("/work");
        f.registry
            .handle_selection(&key, interaction, 1)
            .await
            .unwrap();
        // "No" is option index 1, keystroke "2".
        assert_eq!(f.transport.injects(), vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_but_pending_ones_survive() {
        let f = fixture(RegistryConfig {
            idle_timeout: Duration::from_secs(0),
            sweep_interval: Duration::from_secs(3600),
        });

        f.registry.dispatch_event(final_event("/idle", "x")).await;
        f.registry
            .dispatch_event(HookEvent {
                kind: EventKind::PermissionRequest {
                    prompt: "Allow?".into(),
                    options: vec!["Yes".into()],
                    raw_options: None,
                },
                cwd: "/pending".into(),
                session_id: None,
                received_at: Utc::now(),
            })
            .await;
        settle().await;
        assert_eq!(f.registry.count(), 2);

        // Zero idle timeout: anything not pinned by a permission request
        // goes, once its last activity is in the past.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let removed = f.registry.evict_idle();
        assert_eq!(removed, 1);
        assert_eq!(f.registry.count(), 1);
        assert!(f
            .registry
            .sessions
            .contains_key(&SessionKey::from_cwd("/pending")));
    }

    #[tokio::test]
    async fn dispatcher_feeds_events_through_the_channel() {
        let f = fixture(RegistryConfig::default());
        let (tx, rx) = mpsc::channel(16);
        let task = start_dispatcher(f.registry.clone(), rx);

        tx.send(final_event("/work", "done")).await.unwrap();
        settle().await;

        let calls = f.sink.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, SinkCall::Create { text, .. } if text == "done")));

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn teardown_drops_everything() {
        let f = fixture(RegistryConfig::default());
        f.registry.dispatch_event(final_event("/a", "x")).await;
        f.registry.dispatch_event(final_event("/b", "y")).await;
        settle().await;
        f.registry.teardown();
        assert_eq!(f.registry.count(), 0);
    }
}

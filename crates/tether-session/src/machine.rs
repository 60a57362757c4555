//! Per-session conversation state machine.
//!
//! Each session runs as an actor: a task owning all mutable session state,
//! fed commands through a bounded inbox. Events are applied strictly in
//! arrival order; nothing outside the actor touches its state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tether_core::errors::SelectionError;
use tether_core::events::{EventKind, HookEvent};
use tether_core::ids::{InteractionHandle, MessageHandle, RequestId, SessionKey};
use tether_mux::{PaneTarget, PaneTransport};
use tether_telemetry::MetricsRecorder;

use crate::dedup::DedupWindow;
use crate::narrative::Narrative;
use crate::permission::{resolve_options, PendingPermission, PermissionConfig};
use crate::sink::PresentationSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// User message sent, no terminal event yet.
    AwaitingResponse,
    /// At least one tool-start without a matching tool-end.
    ToolActive,
    /// A permission request is outstanding.
    PermissionPending,
    /// Assistant-final seen, last burst being flushed.
    Finalizing,
}

/// Commands accepted by a session actor.
pub enum SessionCommand {
    Event(HookEvent),
    Chat {
        text: String,
    },
    /// User answered a presented option set. Keyed by the interaction
    /// handle the sink minted, since that is all the frontend ever sees.
    Select {
        interaction: InteractionHandle,
        index: usize,
        reply: oneshot::Sender<Result<(), SelectionError>>,
    },
    PermissionTimeout {
        request: RequestId,
    },
}

/// Per-session knobs plus the shared collaborators every session uses.
#[derive(Clone)]
pub struct SessionConfig {
    pub sink: Arc<dyn PresentationSink>,
    pub transport: Arc<dyn PaneTransport>,
    pub target: PaneTarget,
    pub permission: PermissionConfig,
    pub metrics: Arc<MetricsRecorder>,
    pub inbox_capacity: usize,
}

/// Handle to a running session actor.
pub struct SessionHandle {
    pub tx: mpsc::Sender<SessionCommand>,
    /// Unix seconds of the last command the actor processed.
    pub last_activity: Arc<AtomicU64>,
    /// True while a permission request is outstanding. Idle eviction skips
    /// such sessions.
    pub has_pending_permission: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Spawn the actor for one session.
pub fn spawn(key: SessionKey, config: SessionConfig) -> SessionHandle {
    let (tx, rx) = mpsc::channel(config.inbox_capacity);
    let last_activity = Arc::new(AtomicU64::new(now_secs()));
    let has_pending = Arc::new(AtomicBool::new(false));

    let session = Session {
        key,
        state: SessionState::Idle,
        narrative: Narrative::new(),
        dedup: DedupWindow::default(),
        live: None,
        pending: None,
        last_retired: None,
        config,
        self_tx: tx.clone(),
        last_activity: last_activity.clone(),
        has_pending: has_pending.clone(),
    };
    let task = tokio::spawn(session.run(rx));

    SessionHandle {
        tx,
        last_activity,
        has_pending_permission: has_pending,
        task,
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

struct Session {
    key: SessionKey,
    state: SessionState,
    narrative: Narrative,
    dedup: DedupWindow,
    /// Live status message bound to the current burst.
    live: Option<MessageHandle>,
    pending: Option<PendingPermission>,
    /// Interaction of the most recently resolved or retired request, kept so
    /// late selections against it answer as stale rather than unknown.
    last_retired: Option<InteractionHandle>,
    config: SessionConfig,
    /// Used to schedule permission timeouts back into our own inbox.
    self_tx: mpsc::Sender<SessionCommand>,
    last_activity: Arc<AtomicU64>,
    has_pending: Arc<AtomicBool>,
}

impl Session {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        info!(session = %self.key, "session started");
        while let Some(command) = rx.recv().await {
            self.last_activity.store(now_secs(), Ordering::Relaxed);
            match command {
                SessionCommand::Event(event) => self.apply_event(event).await,
                SessionCommand::Chat { text } => self.on_chat(&text).await,
                SessionCommand::Select {
                    interaction,
                    index,
                    reply,
                } => {
                    let result = self.on_select(&interaction, index).await;
                    let _ = reply.send(result);
                }
                SessionCommand::PermissionTimeout { request } => {
                    self.on_permission_timeout(&request).await;
                }
            }
        }
        info!(session = %self.key, "session stopped");
    }

    async fn apply_event(&mut self, event: HookEvent) {
        let label = event.kind.label().to_string();
        if !self.dedup.insert(&event.kind.fingerprint()) {
            debug!(session = %self.key, kind = %label, "replayed event dropped");
            self.config
                .metrics
                .counter_inc("session.events.deduped", &[], 1);
            return;
        }
        self.config
            .metrics
            .counter_inc("session.events.applied", &[("kind", &label)], 1);

        match event.kind {
            EventKind::ToolStart {
                ref tool_name,
                ref tool_input,
            } => {
                // A new tool means the agent moved past whatever it was
                // asking about.
                if self.pending.is_some() {
                    self.retire_pending("superseded by tool activity").await;
                }
                let pair_key = event.kind.tool_pair_key().unwrap_or_default();
                self.narrative.start_tool(tool_name, tool_input, pair_key);
                self.state = SessionState::ToolActive;
                self.flush().await;
            }
            EventKind::ToolEnd { ref tool_name, .. } => {
                let pair_key = event.kind.tool_pair_key().unwrap_or_default();
                if !self.narrative.complete_tool(tool_name, &pair_key) {
                    // The matching start may predate this process.
                    self.narrative.orphan_tool(tool_name, pair_key);
                }
                if self.state != SessionState::PermissionPending {
                    self.state = if self.narrative.has_running_tools() {
                        SessionState::ToolActive
                    } else {
                        SessionState::AwaitingResponse
                    };
                }
                self.flush().await;
            }
            EventKind::AssistantThought { ref text } => {
                self.narrative.push_thought(text);
                self.flush().await;
            }
            EventKind::AssistantFinal { ref text } => {
                // A final response means the agent moved past any dialog it
                // still had open.
                if self.pending.is_some() {
                    self.retire_pending("superseded by final response").await;
                }
                self.state = SessionState::Finalizing;
                self.flush().await;
                if let Err(e) = self.config.sink.create_message(&self.key, text).await {
                    warn!(session = %self.key, error = %e, "failed to post final message");
                }
                self.narrative.clear();
                self.live = None;
                self.state = SessionState::Idle;
            }
            EventKind::PermissionRequest {
                ref prompt,
                ref options,
                ref raw_options,
            } => {
                // Present the burst so far before switching to the dialog.
                self.flush().await;
                self.on_permission_request(prompt, options, raw_options.as_deref())
                    .await;
            }
            EventKind::Error { ref message } => {
                if self.pending.is_some() {
                    self.retire_pending("superseded by agent error").await;
                }
                self.flush().await;
                let notice = format!("⚠️ **Agent error:** {message}");
                if let Err(e) = self.config.sink.create_message(&self.key, &notice).await {
                    warn!(session = %self.key, error = %e, "failed to post error notice");
                }
                self.narrative.clear();
                self.live = None;
                self.state = SessionState::Idle;
            }
            EventKind::Unknown { ref kind, .. } => {
                self.narrative.generic_entry(kind);
                self.flush().await;
            }
        }
    }

    async fn on_chat(&mut self, text: &str) {
        match self.config.transport.inject(&self.config.target, text).await {
            Ok(()) => {
                self.config.metrics.counter_inc("pane.injects", &[], 1);
                if self.state == SessionState::Idle {
                    self.state = SessionState::AwaitingResponse;
                }
            }
            Err(e) => {
                // The agent's state after a failed injection is unknown, so
                // no retry.
                warn!(session = %self.key, error = %e, "pane inject failed");
                let notice = format!("⚠️ **Could not reach the agent:** {e}");
                if let Err(sink_err) = self.config.sink.create_message(&self.key, &notice).await {
                    warn!(session = %self.key, error = %sink_err, "failed to post transport error notice");
                }
                self.state = SessionState::Idle;
            }
        }
    }

    async fn on_permission_request(
        &mut self,
        prompt: &str,
        structured: &[String],
        raw_options: Option<&str>,
    ) {
        if let Some(pending) = &self.pending {
            if pending.prompt == prompt {
                debug!(session = %self.key, "duplicate permission prompt dropped");
                return;
            }
            // Different prompt: the agent abandoned the old dialog.
            self.retire_pending("superseded").await;
        }

        let options = resolve_options(
            structured,
            raw_options,
            self.config.transport.as_ref(),
            &self.config.target,
            &self.config.permission,
        )
        .await;

        let interaction = match self
            .config
            .sink
            .present_options(&self.key, prompt, &options)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(session = %self.key, error = %e, "failed to present permission options");
                return;
            }
        };

        let pending = PendingPermission::new(prompt.to_string(), options, interaction);
        let request = pending.id.clone();
        self.pending = Some(pending);
        self.has_pending.store(true, Ordering::Relaxed);
        self.state = SessionState::PermissionPending;
        self.config
            .metrics
            .counter_inc("permission.presented", &[], 1);

        let timeout = self.config.permission.timeout;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(SessionCommand::PermissionTimeout { request }).await;
        });
    }

    async fn on_select(
        &mut self,
        interaction: &InteractionHandle,
        index: usize,
    ) -> Result<(), SelectionError> {
        let Some(pending) = &self.pending else {
            // A request that existed and was since resolved or retired is
            // stale; an interaction never presented here is unknown.
            if self.last_retired.as_ref() == Some(interaction) {
                return Err(SelectionError::Stale);
            }
            return Err(SelectionError::NoRequestOutstanding);
        };
        if &pending.interaction != interaction {
            return Err(SelectionError::Stale);
        }
        let Some(option) = pending.options.get(index) else {
            return Err(SelectionError::OutOfRange {
                index,
                len: pending.options.len(),
            });
        };

        let keystroke = option.keystroke.clone();
        if let Err(e) = self
            .config
            .transport
            .inject(&self.config.target, &keystroke)
            .await
        {
            // The agent's state after a failed injection is unknown, so the
            // request is no longer answerable.
            warn!(session = %self.key, error = %e, "keystroke inject failed");
            let notice = format!("⚠️ **Could not reach the agent:** {e}");
            if let Err(sink_err) = self.config.sink.create_message(&self.key, &notice).await {
                warn!(session = %self.key, error = %sink_err, "failed to post transport error notice");
            }
            self.retire_pending("transport failure").await;
            self.state = SessionState::Idle;
            return Err(SelectionError::TransportFailed(e.to_string()));
        }

        if let Some(resolved) = self.pending.take() {
            if let Err(e) = self.config.sink.disable_options(&resolved.interaction).await {
                warn!(session = %self.key, error = %e, "failed to retire answered options");
            }
            self.config.metrics.histogram_observe(
                "permission.resolution_ms",
                &[],
                resolved.created_at.elapsed().as_millis() as f64,
            );
            self.last_retired = Some(resolved.interaction);
        }
        self.has_pending.store(false, Ordering::Relaxed);
        self.state = SessionState::AwaitingResponse;
        self.config
            .metrics
            .counter_inc("permission.resolved", &[], 1);
        Ok(())
    }

    async fn on_permission_timeout(&mut self, request: &RequestId) {
        let still_pending = self.pending.as_ref().is_some_and(|p| &p.id == request);
        if !still_pending {
            return;
        }
        info!(session = %self.key, request = %request, "permission request timed out");
        self.retire_pending("timed out").await;
        self.config
            .metrics
            .counter_inc("permission.timed_out", &[], 1);
        self.state = SessionState::Idle;
    }

    async fn retire_pending(&mut self, reason: &str) {
        if let Some(pending) = self.pending.take() {
            debug!(session = %self.key, request = %pending.id, reason, "retiring permission request");
            if let Err(e) = self.config.sink.disable_options(&pending.interaction).await {
                warn!(session = %self.key, error = %e, "failed to disable stale options");
            }
            self.last_retired = Some(pending.interaction);
        }
        self.has_pending.store(false, Ordering::Relaxed);
    }

    /// Push the current burst to the live status message, creating it on
    /// first use. Sink failures here are logged and swallowed.
    async fn flush(&mut self) {
        if self.narrative.is_empty() {
            return;
        }
        let text = self.narrative.render();
        match &self.live {
            Some(handle) => {
                if let Err(e) = self.config.sink.update_message(handle, &text).await {
                    warn!(session = %self.key, error = %e, "live message update failed");
                }
            }
            None => match self.config.sink.create_message(&self.key, &text).await {
                Ok(handle) => self.live = Some(handle),
                Err(e) => {
                    warn!(session = %self.key, error = %e, "live message create failed");
                }
            },
        }
    }
}

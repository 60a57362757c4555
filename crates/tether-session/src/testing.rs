//! Shared test doubles: a sink that records every call and a scriptable
//! pane transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use tether_core::errors::SinkError;
use tether_core::events::ChoiceOption;
use tether_core::ids::{InteractionHandle, MessageHandle, SessionKey};
use tether_mux::{MuxError, PaneTarget, PaneTransport};

use crate::sink::PresentationSink;

#[derive(Clone, Debug)]
pub enum SinkCall {
    Create { session: SessionKey, text: String },
    Update { message: MessageHandle, text: String },
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    presented: Mutex<Vec<(Vec<ChoiceOption>, InteractionHandle)>>,
    disabled: Mutex<Vec<InteractionHandle>>,
    fail_updates: AtomicBool,
    counter: AtomicU64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn presented_options(&self) -> Vec<(Vec<ChoiceOption>, InteractionHandle)> {
        self.presented.lock().clone()
    }

    pub fn disabled(&self) -> Vec<InteractionHandle> {
        self.disabled.lock().clone()
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::Relaxed);
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl PresentationSink for RecordingSink {
    async fn create_message(
        &self,
        session: &SessionKey,
        text: &str,
    ) -> Result<MessageHandle, SinkError> {
        let handle = MessageHandle::from_raw(format!("msg_{}", self.next_id()));
        self.calls.lock().push(SinkCall::Create {
            session: session.clone(),
            text: text.to_string(),
        });
        Ok(handle)
    }

    async fn update_message(&self, message: &MessageHandle, text: &str) -> Result<(), SinkError> {
        if self.fail_updates.load(Ordering::Relaxed) {
            return Err(SinkError::Unavailable("scripted failure".into()));
        }
        self.calls.lock().push(SinkCall::Update {
            message: message.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn present_options(
        &self,
        _session: &SessionKey,
        _prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<InteractionHandle, SinkError> {
        let handle = InteractionHandle::from_raw(format!("interaction_{}", self.next_id()));
        self.presented
            .lock()
            .push((options.to_vec(), handle.clone()));
        Ok(handle)
    }

    async fn disable_options(&self, interaction: &InteractionHandle) -> Result<(), SinkError> {
        self.disabled.lock().push(interaction.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockTransport {
    injects: Mutex<Vec<String>>,
    captures: Mutex<VecDeque<Vec<String>>>,
    fail_injects: AtomicBool,
    cwd: Mutex<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            cwd: Mutex::new("/work".to_string()),
            ..Default::default()
        }
    }

    pub fn injects(&self) -> Vec<String> {
        self.injects.lock().clone()
    }

    pub fn push_capture(&self, lines: Vec<String>) {
        self.captures.lock().push_back(lines);
    }

    pub fn fail_injects(&self, fail: bool) {
        self.fail_injects.store(fail, Ordering::Relaxed);
    }

    pub fn set_cwd(&self, cwd: &str) {
        *self.cwd.lock() = cwd.to_string();
    }
}

#[async_trait]
impl PaneTransport for MockTransport {
    async fn inject(&self, target: &PaneTarget, text: &str) -> Result<(), MuxError> {
        if self.fail_injects.load(Ordering::Relaxed) {
            return Err(MuxError::PaneNotFound(target.to_string()));
        }
        self.injects.lock().push(text.to_string());
        Ok(())
    }

    async fn capture(
        &self,
        _target: &PaneTarget,
        _tail_lines: u32,
    ) -> Result<Vec<String>, MuxError> {
        Ok(self.captures.lock().pop_front().unwrap_or_default())
    }

    async fn discover(&self) -> Result<PaneTarget, MuxError> {
        Ok(PaneTarget::new("main", 0, 0))
    }

    async fn pane_cwd(&self, _target: &PaneTarget) -> Result<String, MuxError> {
        Ok(self.cwd.lock().clone())
    }

    async fn is_active(&self, _target: &PaneTarget) -> bool {
        true
    }
}

use async_trait::async_trait;
use tracing::info;

use tether_core::errors::SinkError;
use tether_core::events::ChoiceOption;
use tether_core::ids::{InteractionHandle, MessageHandle, SessionKey};

/// Outbound presentation surface consumed by the session layer.
///
/// `update_message` failure is non-fatal by contract: presentation is
/// best-effort relative to the agent's continued execution, so callers log
/// and keep narrating.
#[async_trait]
pub trait PresentationSink: Send + Sync {
    /// Post a new message for the session, returning a handle for edits.
    async fn create_message(
        &self,
        session: &SessionKey,
        text: &str,
    ) -> Result<MessageHandle, SinkError>;

    /// Replace the text of a previously created message.
    async fn update_message(&self, message: &MessageHandle, text: &str) -> Result<(), SinkError>;

    /// Present a prompt with selectable options, returning a handle used to
    /// retire the option set later.
    async fn present_options(
        &self,
        session: &SessionKey,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<InteractionHandle, SinkError>;

    /// Retire an option set so late clicks have nothing to land on.
    async fn disable_options(&self, interaction: &InteractionHandle) -> Result<(), SinkError>;
}

/// Sink that writes everything to the log. Used when no chat frontend is
/// wired up, and as the reference implementation of the contract.
#[derive(Default)]
pub struct LogSink;

#[async_trait]
impl PresentationSink for LogSink {
    async fn create_message(
        &self,
        session: &SessionKey,
        text: &str,
    ) -> Result<MessageHandle, SinkError> {
        let handle = MessageHandle::from_raw(format!("log_{}", uuid::Uuid::now_v7()));
        info!(session = %session, message = %handle, %text, "sink: create message");
        Ok(handle)
    }

    async fn update_message(&self, message: &MessageHandle, text: &str) -> Result<(), SinkError> {
        info!(message = %message, %text, "sink: update message");
        Ok(())
    }

    async fn present_options(
        &self,
        session: &SessionKey,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<InteractionHandle, SinkError> {
        let handle = InteractionHandle::from_raw(format!("log_{}", uuid::Uuid::now_v7()));
        let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        info!(session = %session, interaction = %handle, %prompt, ?labels, "sink: present options");
        Ok(handle)
    }

    async fn disable_options(&self, interaction: &InteractionHandle) -> Result<(), SinkError> {
        info!(interaction = %interaction, "sink: disable options");
        Ok(())
    }
}

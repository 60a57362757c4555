//! Pane transport backed by the `tmux` binary.
//!
//! Every operation is one external process invocation; there is no
//! acknowledgement channel, so callers never assume the agent has reacted
//! just because an inject returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::target::PaneTarget;

#[derive(Clone, Debug, thiserror::Error)]
pub enum MuxError {
    #[error("tmux is not available: {0}")]
    NotAvailable(String),
    #[error("pane not found: {0}")]
    PaneNotFound(String),
    #[error("tmux {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("no pane running the agent was found")]
    NoAgentPane,
}

impl MuxError {
    /// Target-not-found and discovery misses are operator configuration
    /// problems; they fail fast and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotAvailable(_) | Self::NoAgentPane)
    }
}

/// Keystroke injection and screen capture against one multiplexer pane.
#[async_trait]
pub trait PaneTransport: Send + Sync {
    /// Send literal text to the pane, wait for the input line to settle,
    /// then send the activation keystroke.
    async fn inject(&self, target: &PaneTarget, text: &str) -> Result<(), MuxError>;

    /// Return the last `tail_lines` rendered lines of the pane buffer.
    async fn capture(&self, target: &PaneTarget, tail_lines: u32) -> Result<Vec<String>, MuxError>;

    /// Scan all panes and return the first one hosting the agent.
    async fn discover(&self) -> Result<PaneTarget, MuxError>;

    /// Current working directory of the pane's foreground process.
    async fn pane_cwd(&self, target: &PaneTarget) -> Result<String, MuxError>;

    /// Whether the pane still exists and is addressable.
    async fn is_active(&self, target: &PaneTarget) -> bool;
}

#[derive(Clone, Debug)]
pub struct TmuxConfig {
    /// Process name the agent runs under, matched against each pane's
    /// current command during discovery.
    pub agent_command: String,
    /// Text present in the agent's idle prompt, used as a discovery
    /// fallback when no pane command matches.
    pub ready_signature: String,
    /// Pause between sending text and sending Enter, giving the agent's
    /// input widget time to absorb a paste.
    pub settle: Duration,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            agent_command: "claude".to_string(),
            ready_signature: "? for shortcuts".to_string(),
            settle: Duration::from_millis(200),
        }
    }
}

/// Real transport shelling out to `tmux`.
///
/// Injects into the same pane are serialized with a per-target mutex so two
/// concurrent sends cannot interleave their text and Enter keystrokes.
pub struct TmuxTransport {
    config: TmuxConfig,
    inject_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl TmuxTransport {
    pub fn new(config: TmuxConfig) -> Self {
        Self {
            config,
            inject_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, target: &PaneTarget) -> Arc<tokio::sync::Mutex<()>> {
        self.inject_locks
            .entry(target.to_string())
            .or_default()
            .clone()
    }

    async fn run_tmux(&self, args: &[&str]) -> Result<String, MuxError> {
        let output = tokio::process::Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| MuxError::NotAvailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let command = args.first().copied().unwrap_or("").to_string();
            if stderr.to_lowercase().contains("can't find pane")
                || stderr.to_lowercase().contains("can't find window")
                || stderr.to_lowercase().contains("can't find session")
            {
                return Err(MuxError::PaneNotFound(stderr));
            }
            return Err(MuxError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PaneTransport for TmuxTransport {
    async fn inject(&self, target: &PaneTarget, text: &str) -> Result<(), MuxError> {
        let lock = self.lock_for(target);
        let _guard = lock.lock().await;

        let addr = target.to_string();
        debug!(target = %addr, chars = text.len(), "injecting text into pane");
        self.run_tmux(&["send-keys", "-t", &addr, "-l", text]).await?;
        tokio::time::sleep(self.config.settle).await;
        self.run_tmux(&["send-keys", "-t", &addr, "Enter"]).await?;
        Ok(())
    }

    async fn capture(&self, target: &PaneTarget, tail_lines: u32) -> Result<Vec<String>, MuxError> {
        let addr = target.to_string();
        let start = format!("-{tail_lines}");
        let raw = self
            .run_tmux(&["capture-pane", "-t", &addr, "-p", "-S", &start])
            .await?;
        Ok(raw.lines().map(str::to_owned).collect())
    }

    async fn discover(&self) -> Result<PaneTarget, MuxError> {
        let listing = self
            .run_tmux(&[
                "list-panes",
                "-a",
                "-F",
                "#{session_name}:#{window_index}.#{pane_index} #{pane_current_command}",
            ])
            .await?;
        let panes = parse_pane_listing(&listing);

        if let Some(target) = find_by_command(&panes, &self.config.agent_command) {
            debug!(target = %target, "discovered agent pane by command name");
            return Ok(target);
        }

        // The agent may be a child of a shell, in which case the pane's
        // current command won't match. Fall back to looking for its idle
        // prompt in each pane's rendered buffer.
        for (target, _) in &panes {
            let lines = self.capture(target, 50).await.unwrap_or_default();
            if lines.iter().any(|l| l.contains(&self.config.ready_signature)) {
                debug!(target = %target, "discovered agent pane by ready signature");
                return Ok(target.clone());
            }
        }

        warn!(panes = panes.len(), "no agent pane found during discovery");
        Err(MuxError::NoAgentPane)
    }

    async fn pane_cwd(&self, target: &PaneTarget) -> Result<String, MuxError> {
        let addr = target.to_string();
        let cwd = self
            .run_tmux(&["display-message", "-t", &addr, "-p", "#{pane_current_path}"])
            .await?;
        Ok(cwd.trim().to_string())
    }

    async fn is_active(&self, target: &PaneTarget) -> bool {
        let addr = target.to_string();
        self.run_tmux(&["display-message", "-t", &addr, "-p", "#{pane_id}"])
            .await
            .is_ok()
    }
}

/// Parse `list-panes -a` output into (target, current command) pairs,
/// skipping lines that don't parse as pane addresses.
pub fn parse_pane_listing(listing: &str) -> Vec<(PaneTarget, String)> {
    listing
        .lines()
        .filter_map(|line| {
            let (addr, command) = line.trim().split_once(' ')?;
            let target: PaneTarget = addr.parse().ok()?;
            Some((target, command.to_string()))
        })
        .collect()
}

fn find_by_command(panes: &[(PaneTarget, String)], agent_command: &str) -> Option<PaneTarget> {
    panes
        .iter()
        .find(|(_, command)| command == agent_command)
        .map(|(target, _)| target.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_parses_targets_and_commands() {
        let listing = "main:0.0 zsh\nmain:0.1 claude\nwork:2.0 vim\n";
        let panes = parse_pane_listing(listing);
        assert_eq!(panes.len(), 3);
        assert_eq!(panes[1].0.to_string(), "main:0.1");
        assert_eq!(panes[1].1, "claude");
    }

    #[test]
    fn malformed_listing_lines_are_skipped() {
        let listing = "garbage\nmain:0.0 zsh\n\nnot-a-pane claude\n";
        let panes = parse_pane_listing(listing);
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].1, "zsh");
    }

    #[test]
    fn command_match_picks_first_agent_pane() {
        let panes = parse_pane_listing("a:0.0 zsh\nb:1.0 claude\nc:0.2 claude\n");
        let found = find_by_command(&panes, "claude").unwrap();
        assert_eq!(found.to_string(), "b:1.0");
    }

    #[test]
    fn command_match_misses_when_absent() {
        let panes = parse_pane_listing("a:0.0 zsh\nb:1.0 vim\n");
        assert!(find_by_command(&panes, "claude").is_none());
    }

    #[test]
    fn default_config_values() {
        let config = TmuxConfig::default();
        assert_eq!(config.agent_command, "claude");
        assert_eq!(config.settle, Duration::from_millis(200));
    }

    #[test]
    fn fatal_classification() {
        assert!(MuxError::NoAgentPane.is_fatal());
        assert!(MuxError::NotAvailable("enoent".into()).is_fatal());
        assert!(!MuxError::PaneNotFound("main:0.9".into()).is_fatal());
    }
}

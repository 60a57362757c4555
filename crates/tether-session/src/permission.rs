//! Permission request lifecycle.
//!
//! At most one outstanding request per session. Options come from the
//! richest source available: a structured list on the event, raw rendered
//! option text forwarded by the hook, a scrape of the live pane, and
//! finally the agent's stock three-option dialog.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use tether_core::events::ChoiceOption;
use tether_core::ids::{InteractionHandle, RequestId};
use tether_mux::{diff_tail, parse_choice_options, stock_options, PaneTarget, PaneTransport};

#[derive(Clone, Debug)]
pub struct PermissionConfig {
    /// How long an unanswered request stays live before it is retired.
    pub timeout: Duration,
    /// Total time spent polling the pane for a rendered option menu.
    pub scrape_window: Duration,
    /// Pause between scrape attempts.
    pub scrape_interval: Duration,
    /// Lines captured per scrape attempt.
    pub capture_lines: u32,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            scrape_window: Duration::from_secs(5),
            scrape_interval: Duration::from_millis(500),
            capture_lines: 50,
        }
    }
}

/// One outstanding permission request.
#[derive(Debug)]
pub struct PendingPermission {
    pub id: RequestId,
    pub prompt: String,
    pub options: Vec<ChoiceOption>,
    pub interaction: InteractionHandle,
    pub created_at: Instant,
}

impl PendingPermission {
    pub fn new(prompt: String, options: Vec<ChoiceOption>, interaction: InteractionHandle) -> Self {
        Self {
            id: RequestId::new(),
            prompt,
            options,
            interaction,
            created_at: Instant::now(),
        }
    }
}

/// Build the option set for a prompt.
///
/// Structured labels win; keystrokes for those are positional since the
/// dialog numbers them in presentation order. Raw option text is parsed the
/// same way pane captures are. When the event carries neither, the pane is
/// polled for a rendered menu, and the stock dialog is the last resort.
pub async fn resolve_options(
    structured: &[String],
    raw_options: Option<&str>,
    transport: &dyn PaneTransport,
    target: &PaneTarget,
    config: &PermissionConfig,
) -> Vec<ChoiceOption> {
    if !structured.is_empty() {
        return structured
            .iter()
            .enumerate()
            .map(|(i, label)| ChoiceOption::new(label, (i + 1).to_string()))
            .collect();
    }

    if let Some(raw) = raw_options {
        let lines: Vec<String> = raw.lines().map(str::to_owned).collect();
        let parsed = parse_choice_options(&lines);
        if !parsed.is_empty() {
            return parsed;
        }
    }

    if let Some(scraped) = scrape_pane_options(transport, target, config).await {
        return scraped;
    }

    debug!(target = %target, "no option menu found, falling back to stock dialog");
    stock_options()
}

async fn scrape_pane_options(
    transport: &dyn PaneTransport,
    target: &PaneTarget,
    config: &PermissionConfig,
) -> Option<Vec<ChoiceOption>> {
    let deadline = Instant::now() + config.scrape_window;
    let mut prev: Vec<String> = Vec::new();
    loop {
        match transport.capture(target, config.capture_lines).await {
            Ok(lines) => {
                // Captures are snapshots, not a stream; only reparse when the
                // pane actually moved.
                let appended = diff_tail(&prev, &lines);
                if appended.degraded || !appended.new_lines.is_empty() {
                    let options = parse_choice_options(&lines);
                    if !options.is_empty() {
                        debug!(target = %target, count = options.len(), "scraped option menu from pane");
                        return Some(options);
                    }
                }
                prev = lines;
            }
            Err(e) => {
                warn!(target = %target, error = %e, "pane capture failed during option scrape");
                return None;
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(config.scrape_interval).await;
    }
}

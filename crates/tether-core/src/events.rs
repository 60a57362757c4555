use chrono::{DateTime, Utc};

use crate::fingerprint::content_fingerprint;

/// One lifecycle occurrence pushed by an agent-side hook script.
///
/// Events are not globally ordered across sessions; within a session they are
/// applied strictly in intake-arrival order, so `received_at` is stamped here
/// and no clock from the emitting process is trusted.
#[derive(Clone, Debug)]
pub struct HookEvent {
    pub kind: EventKind,
    /// Working-directory tag of the emitting agent instance.
    pub cwd: String,
    /// Agent-assigned session id, when the hook carries one.
    pub session_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Closed tagged-variant payload per event kind. Unrecognized kinds decode
/// into `Unknown` with their raw fields preserved, so new agent tool types
/// render with a generic fallback instead of being rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    ToolStart {
        tool_name: String,
        tool_input: serde_json::Value,
    },
    ToolEnd {
        tool_name: String,
        tool_input: serde_json::Value,
        result_preview: Option<String>,
    },
    AssistantThought {
        text: String,
    },
    AssistantFinal {
        text: String,
    },
    PermissionRequest {
        prompt: String,
        /// Option labels, when the hook carries a structured list.
        options: Vec<String>,
        /// Raw rendered option text, when the hook forwards it verbatim.
        raw_options: Option<String>,
    },
    Error {
        message: String,
    },
    Unknown {
        kind: String,
        fields: serde_json::Value,
    },
}

/// One selectable answer to a permission prompt: a human label plus the
/// literal keystroke payload injected into the pane if chosen.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub keystroke: String,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, keystroke: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            keystroke: keystroke.into(),
        }
    }
}

/// Why a payload failed to decode. Decode failures are protocol errors:
/// dropped at the intake boundary, never user-visible.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    NotJson(String),
    #[error("payload is not a JSON object")]
    NotObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

impl HookEvent {
    /// Decode one intake payload, stamping the arrival time. The envelope
    /// fields (`kind`, `cwd`, `session_id`) are required/optional as shown;
    /// everything else is kind-specific and picked out once the kind is known.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::NotJson(e.to_string()))?;
        let serde_json::Value::Object(mut fields) = value else {
            return Err(DecodeError::NotObject);
        };

        let kind = match fields.remove("kind") {
            Some(serde_json::Value::String(s)) => s,
            _ => return Err(DecodeError::MissingField("kind")),
        };
        let cwd = match fields.remove("cwd") {
            Some(serde_json::Value::String(s)) => s,
            _ => return Err(DecodeError::MissingField("cwd")),
        };
        let session_id = fields
            .remove("session_id")
            .and_then(|v| v.as_str().map(str::to_owned));

        Ok(Self {
            kind: EventKind::from_raw(&kind, fields)?,
            cwd,
            session_id,
            received_at: Utc::now(),
        })
    }
}

impl EventKind {
    fn from_raw(
        kind: &str,
        mut fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, DecodeError> {
        let take_str = |fields: &mut serde_json::Map<String, serde_json::Value>, name| {
            fields.remove(name).and_then(|v| match v {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
        };

        let parsed = match kind {
            "tool_start" => Self::ToolStart {
                tool_name: take_str(&mut fields, "tool_name")
                    .ok_or(DecodeError::MissingField("tool_name"))?,
                tool_input: fields.remove("tool_input").unwrap_or(serde_json::Value::Null),
            },
            "tool_end" => Self::ToolEnd {
                tool_name: take_str(&mut fields, "tool_name")
                    .ok_or(DecodeError::MissingField("tool_name"))?,
                tool_input: fields.remove("tool_input").unwrap_or(serde_json::Value::Null),
                result_preview: take_str(&mut fields, "result_preview"),
            },
            "assistant_thought" => Self::AssistantThought {
                text: take_str(&mut fields, "text").ok_or(DecodeError::MissingField("text"))?,
            },
            "assistant_final" => Self::AssistantFinal {
                text: take_str(&mut fields, "text").ok_or(DecodeError::MissingField("text"))?,
            },
            "permission_request" => Self::PermissionRequest {
                prompt: take_str(&mut fields, "prompt")
                    .ok_or(DecodeError::MissingField("prompt"))?,
                options: fields
                    .remove("options")
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default(),
                raw_options: take_str(&mut fields, "raw_options"),
            },
            "error" => Self::Error {
                message: take_str(&mut fields, "message")
                    .ok_or(DecodeError::MissingField("message"))?,
            },
            other => Self::Unknown {
                kind: other.to_string(),
                fields: serde_json::Value::Object(fields),
            },
        };
        Ok(parsed)
    }

    /// Short classification string for logging/metrics.
    pub fn label(&self) -> &str {
        match self {
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::AssistantThought { .. } => "assistant_thought",
            Self::AssistantFinal { .. } => "assistant_final",
            Self::PermissionRequest { .. } => "permission_request",
            Self::Error { .. } => "error",
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Content fingerprint for replay deduplication. Includes the kind tag so
    /// a tool-end never masks its own tool-start.
    pub fn fingerprint(&self) -> String {
        match self {
            Self::ToolStart { tool_name, tool_input } | Self::ToolEnd { tool_name, tool_input, .. } => {
                let input = tool_input.to_string();
                content_fingerprint(&[self.label(), tool_name, &input])
            }
            Self::AssistantThought { text } | Self::AssistantFinal { text } => {
                content_fingerprint(&[self.label(), text])
            }
            Self::PermissionRequest { prompt, .. } => {
                content_fingerprint(&[self.label(), prompt])
            }
            Self::Error { message } => content_fingerprint(&[self.label(), message]),
            Self::Unknown { kind, fields } => {
                let raw = fields.to_string();
                content_fingerprint(&["unknown", kind, &raw])
            }
        }
    }

    /// Pairing key shared by a tool-start and its tool-end: the tool name
    /// plus its input, kind tag excluded. `None` for non-tool events.
    pub fn tool_pair_key(&self) -> Option<String> {
        match self {
            Self::ToolStart { tool_name, tool_input } | Self::ToolEnd { tool_name, tool_input, .. } => {
                let input = tool_input.to_string();
                Some(content_fingerprint(&["tool", tool_name, &input]))
            }
            _ => None,
        }
    }
}

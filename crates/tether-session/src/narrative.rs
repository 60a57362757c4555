//! Per-session activity narrative.
//!
//! Derived, mutable text state built incrementally from events. One burst
//! lives between two flush points; it is never persisted and is rebuilt from
//! scratch each session lifetime.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolStatus {
    Running,
    Done,
    /// Tool-end with no observed tool-start. Rendered as completed, since
    /// the start may predate this process.
    Orphaned,
}

#[derive(Clone, Debug)]
pub struct ToolEntry {
    pub tool_name: String,
    pub pair_key: String,
    pub status: ToolStatus,
    start_text: Option<String>,
    done_text: Option<String>,
}

/// Rolling narrative for the current burst: in-progress tool entries plus a
/// thinking buffer.
#[derive(Debug, Default)]
pub struct Narrative {
    entries: Vec<ToolEntry>,
    thoughts: Vec<String>,
}

impl Narrative {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.thoughts.is_empty()
    }

    pub fn has_running_tools(&self) -> bool {
        self.entries.iter().any(|e| e.status == ToolStatus::Running)
    }

    /// Record a tool starting.
    pub fn start_tool(&mut self, tool_name: &str, tool_input: &Value, pair_key: String) {
        self.entries.push(ToolEntry {
            tool_name: tool_name.to_string(),
            pair_key,
            status: ToolStatus::Running,
            start_text: Some(describe_tool_start(tool_name, tool_input)),
            done_text: None,
        });
    }

    /// Mark the oldest running entry with this pair key as done. Returns
    /// false when no matching start was seen.
    pub fn complete_tool(&mut self, tool_name: &str, pair_key: &str) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.status == ToolStatus::Running && e.pair_key == pair_key)
        {
            entry.status = ToolStatus::Done;
            entry.done_text = describe_tool_end(tool_name);
            return true;
        }
        false
    }

    /// Insert a standalone completed entry for a tool-end that never had a
    /// visible start.
    pub fn orphan_tool(&mut self, tool_name: &str, pair_key: String) {
        self.entries.push(ToolEntry {
            tool_name: tool_name.to_string(),
            pair_key,
            status: ToolStatus::Orphaned,
            start_text: None,
            done_text: describe_tool_end(tool_name).or_else(|| {
                Some(format!("✅ **{tool_name} completed**"))
            }),
        });
    }

    /// Generic entry for an event kind this build does not recognize.
    pub fn generic_entry(&mut self, label: &str) {
        self.entries.push(ToolEntry {
            tool_name: label.to_string(),
            pair_key: String::new(),
            status: ToolStatus::Done,
            start_text: Some(format!("🔧 **{label}**")),
            done_text: None,
        });
    }

    pub fn push_thought(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.thoughts.push(text.trim().to_string());
        }
    }

    /// Render the burst for display. Entry order is arrival order.
    pub fn render(&self) -> String {
        let mut blocks = Vec::new();
        for entry in &self.entries {
            if let Some(start) = &entry.start_text {
                blocks.push(start.clone());
            }
            if let Some(done) = &entry.done_text {
                blocks.push(done.clone());
            }
        }
        if !self.thoughts.is_empty() {
            blocks.push(format!("💭 {}", self.thoughts.join("\n")));
        }
        blocks.join("\n\n")
    }

    /// Drop everything, starting a fresh burst.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.thoughts.clear();
    }

    pub fn completed_entries(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status != ToolStatus::Running)
            .count()
    }
}

fn str_field<'a>(input: &'a Value, name: &str) -> &'a str {
    input.get(name).and_then(Value::as_str).unwrap_or("")
}

/// One display block per tool invocation, glyph-coded by tool.
pub fn describe_tool_start(tool_name: &str, input: &Value) -> String {
    match tool_name {
        "Bash" => {
            let command = str_field(input, "command");
            let description = str_field(input, "description");
            let mut text = "💻 **Bash**".to_string();
            if !description.is_empty() {
                text.push_str(&format!(" - {description}"));
            }
            text.push_str(&format!("\n```bash\n{command}\n```"));
            text
        }
        "Read" => {
            let file_path = str_field(input, "file_path");
            let offset = input.get("offset").and_then(Value::as_u64);
            let limit = input.get("limit").and_then(Value::as_u64);
            let range = match (offset, limit) {
                (Some(start), Some(len)) => format!(" (lines {}-{})", start, start + len),
                (Some(start), None) => format!(" (from line {start})"),
                (None, Some(len)) => format!(" (lines 0-{len})"),
                (None, None) => String::new(),
            };
            format!("📖 **Reading:** `{file_path}`{range}")
        }
        "Edit" => {
            let file_path = str_field(input, "file_path");
            format!("✏️ **Editing:** `{file_path}`")
        }
        "MultiEdit" => {
            let file_path = str_field(input, "file_path");
            let edits = input
                .get("edits")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            format!("✏️ **Multi-editing:** `{file_path}` ({edits} changes)")
        }
        "Write" => {
            let file_path = str_field(input, "file_path");
            format!("✍️ **Writing:** `{file_path}`")
        }
        "Grep" => {
            let pattern = str_field(input, "pattern");
            let path = str_field(input, "path");
            format!("🔍 **Searching in:** `{path}`\n```regex\n{pattern}\n```")
        }
        "Glob" => {
            let pattern = str_field(input, "pattern");
            format!("🗂️ **Finding files:** `{pattern}`")
        }
        "LS" => {
            let path = str_field(input, "path");
            format!("📂 **Listing:** `{path}`")
        }
        "TodoWrite" => {
            let mut text = "📝 **Managing todos:**".to_string();
            if let Some(todos) = input.get("todos").and_then(Value::as_array) {
                for todo in todos {
                    let content = str_field(todo, "content");
                    let glyph = match str_field(todo, "status") {
                        "pending" => "⏳",
                        "in_progress" => "🔄",
                        "completed" => "✅",
                        _ => "❓",
                    };
                    text.push_str(&format!("\n{glyph} {content}"));
                }
            }
            text
        }
        "WebSearch" => {
            let query = str_field(input, "query");
            format!("🌐 **Web Search:**\n```\n{query}\n```")
        }
        other => format!("🔧 **{other}**"),
    }
}

/// Completion line per tool. `None` silences the completion (Read results
/// are noise next to the start line).
pub fn describe_tool_end(tool_name: &str) -> Option<String> {
    let text = match tool_name {
        "Edit" => "✅ **Edit completed**",
        "MultiEdit" => "✅ **Multi-edit completed**",
        "Write" => "✅ **File created**",
        "Bash" => "✅ **Command completed**",
        "Grep" => "✅ **Search completed**",
        "Glob" => "✅ **File search completed**",
        "WebSearch" => "✅ **Web search completed**",
        "Read" => return None,
        other => return Some(format!("✅ **{other} completed**")),
    };
    Some(text.to_string())
}

//! Output formatting utilities for the CLI.

use chrono::{DateTime, Utc};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::domain::models::Severity;

/// Result of a command, printable as a table or as JSON.
pub trait CommandOutput: Serialize {
    /// Text for a terminal.
    fn to_human(&self) -> String;

    /// JSON form; defaults to the serde encoding.
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Print `result` in the requested mode.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum length, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Table with bold headers and the shared preset.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    table
}

/// Cell colored by severity.
pub fn severity_cell(label: &str, severity: Severity) -> Cell {
    let color = match severity {
        Severity::Ok => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Critical => Color::Red,
    };
    Cell::new(label).fg(color)
}

/// Whole days, or "-" when unknown.
pub fn format_age(age: Option<std::time::Duration>) -> String {
    age.map_or_else(|| "-".to_string(), |a| format!("{}d", a.as_secs() / 86_400))
}

/// Minute-precision UTC time, or "-" when unknown.
pub fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
}

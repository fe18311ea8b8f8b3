use serde::Serialize;

use crate::error::{BundleError, Result};

/// JSON error document printed on stdout in robot mode.
#[derive(Serialize)]
pub struct RobotError {
    pub error: bool,
    pub category: crate::error::ErrorCategory,
    pub recoverable: bool,
    pub message: String,
}

impl From<&BundleError> for RobotError {
    fn from(err: &BundleError) -> Self {
        Self {
            error: true,
            category: err.category(),
            recoverable: err.is_recoverable(),
            message: err.to_string(),
        }
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 14,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.to_string());
        self.lines.push("=".repeat(text.len().max(3)));
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(String::new());
        self.lines.push(text.to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        self.lines
            .push(format!("{key:width$} {value}", width = self.key_width));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn push_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

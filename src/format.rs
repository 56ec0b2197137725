use anyhow::{Context as _, Result};
use serde::Serialize;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Pretty-printed JSON, one document per command.
    Json,
}

impl OutputFormat {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    /// Print `data` as JSON, or fall back to `text` for the text format.
    pub fn emit<T: Serialize>(self, data: &T, text: impl FnOnce() -> String) -> Result<()> {
        match self {
            Self::Json => {
                let rendered =
                    serde_json::to_string_pretty(data).context("JSON serialization failed")?;
                println!("{rendered}");
            }
            Self::Text => {
                let rendered = text();
                if !rendered.is_empty() {
                    println!("{rendered}");
                }
            }
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker role for a plain conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One fragment of a tool result. Tools may return plain text or a
/// structured value; results are ordered sequences of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    Text { text: String },
    Json { value: Value },
}

impl Fragment {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Fragment::Text { text: text.into() }
    }

    pub fn json(value: Value) -> Self {
        Fragment::Json { value }
    }

    /// Get the text if this is a Text fragment
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Fragment::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Wrap a tool's return value: strings stay textual, everything else
    /// is carried as structured JSON.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Fragment::Text { text },
            other => Fragment::Json { value: other },
        }
    }
}

/// Concatenate the textual payload of a fragment sequence. Json fragments
/// are rendered compactly; an empty sequence yields an empty string.
pub fn fragments_to_text(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(|fragment| match fragment {
            Fragment::Text { text } => text.clone(),
            Fragment::Json { value } => value.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

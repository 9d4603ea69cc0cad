// Unified provider entry for the model service configuration.

use serde::{Deserialize, Serialize};

/// A single provider entry.
///
/// Serializes with a `type` tag, e.g.:
/// ```toml
/// [[providers]]
/// type = "claude"
/// api_key = "sk-ant-..."
///
/// [[providers]]
/// type = "gemini"
/// api_key = "AIza..."
/// model = "gemini-2.0-flash"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEntry {
    Claude {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Gemini {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ProviderEntry {
    /// Display name for status messages.
    pub fn display_name(&self) -> &str {
        match self {
            ProviderEntry::Claude { name, .. } => name.as_deref().unwrap_or("Claude"),
            ProviderEntry::Gemini { name, .. } => name.as_deref().unwrap_or("Gemini"),
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            ProviderEntry::Claude { api_key, .. } | ProviderEntry::Gemini { api_key, .. } => {
                api_key
            }
        }
    }
}

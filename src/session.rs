// Per-attempt session identity
//
// Every generation and evaluation call carries a freshly minted token so the
// provider cannot correlate it with prior calls. Tokens are opaque and
// single-use; nothing in the pipeline reads their structure back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, single-use correlation token for one model call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a fresh, unlinkable token.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Gateway factory
//
// Creates model gateways from provider configuration entries.

use anyhow::Result;

use super::claude::ClaudeGateway;
use super::gemini::GeminiGateway;
use super::ModelGateway;
use crate::config::ProviderEntry;

/// Create a boxed `ModelGateway` from a configuration entry.
pub fn create_gateway(entry: &ProviderEntry) -> Result<Box<dyn ModelGateway>> {
    match entry {
        ProviderEntry::Claude {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut gateway = ClaudeGateway::new(api_key.clone())?;
            if let Some(m) = model {
                gateway = gateway.with_model(m.clone());
            }
            if let Some(url) = base_url {
                gateway = gateway.with_base_url(url.clone());
            }
            Ok(Box::new(gateway))
        }

        ProviderEntry::Gemini { api_key, model, .. } => {
            let mut gateway = GeminiGateway::new(api_key.clone())?;
            if let Some(m) = model {
                gateway = gateway.with_model(m.clone());
            }
            Ok(Box::new(gateway))
        }
    }
}

// Configuration loader
// Loads providers from ~/.restyle/config.toml or environment variables

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;

use super::provider::ProviderEntry;
use super::settings::{default_artifacts_db, Config, RefineSettings};

/// Load configuration from the restyle config file or environment.
pub fn load_config() -> Result<Config> {
    if let Some(config) = try_load_from_file()? {
        return Ok(config);
    }

    // Fall back to environment variables.
    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        if !api_key.is_empty() {
            return Ok(Config::with_providers(vec![ProviderEntry::Claude {
                api_key,
                model: None,
                base_url: None,
                name: Some("Claude (Environment)".to_string()),
            }]));
        }
    }
    if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
        if !api_key.is_empty() {
            return Ok(Config::with_providers(vec![ProviderEntry::Gemini {
                api_key,
                model: None,
                name: Some("Gemini (Environment)".to_string()),
            }]));
        }
    }

    bail!(
        "No configuration found. Create ~/.restyle/config.toml:\n\n\
        [[providers]]\n\
        type = \"claude\"\n\
        api_key = \"sk-ant-...\"\n\n\
        Alternatively, set an environment variable:\n\
        export ANTHROPIC_API_KEY=\"sk-ant-...\""
    );
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".restyle/config.toml"))
}

fn try_load_from_file() -> Result<Option<Config>> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = parse_config(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(parsed))
}

fn parse_config(contents: &str) -> Result<Config> {
    #[derive(serde::Deserialize)]
    struct TomlConfig {
        #[serde(default)]
        providers: Vec<ProviderEntry>,
        #[serde(default)]
        refine: Option<RefineSettings>,
        #[serde(default)]
        artifacts_db: Option<PathBuf>,
    }

    let parsed: TomlConfig = toml::from_str(contents)?;
    if parsed.providers.is_empty() {
        bail!("config file defines no [[providers]] entries");
    }
    for provider in &parsed.providers {
        if provider.api_key().trim().is_empty() {
            bail!("provider '{}' has an empty api_key", provider.display_name());
        }
    }

    Ok(Config {
        providers: parsed.providers,
        refine: parsed.refine.unwrap_or_default(),
        artifacts_db: parsed.artifacts_db.unwrap_or_else(default_artifacts_db),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let contents = r#"
            artifacts_db = "/tmp/restyle-test/artifacts.db"

            [[providers]]
            type = "claude"
            api_key = "sk-ant-test"

            [[providers]]
            type = "gemini"
            api_key = "AIza-test"

            [refine]
            max_iterations = 7
            quality_threshold = 0.8
        "#;
        let config = parse_config(contents).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.refine.max_iterations, 7);
        assert_eq!(config.refine.quality_threshold, Some(0.8));
        assert_eq!(
            config.artifacts_db,
            PathBuf::from("/tmp/restyle-test/artifacts.db")
        );
    }

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let contents = r#"
            [[providers]]
            type = "claude"
            api_key = "sk-ant-test"
        "#;
        let config = parse_config(contents).unwrap();
        assert_eq!(config.refine.max_iterations, 5);
        assert!(config.artifacts_db.ends_with("artifacts.db"));
    }

    #[test]
    fn test_empty_providers_rejected() {
        assert!(parse_config("").is_err());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let contents = r#"
            [[providers]]
            type = "claude"
            api_key = ""
        "#;
        assert!(parse_config(contents).is_err());
    }
}

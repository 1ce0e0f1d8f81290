//! `toolrelay config`: Configuration management commands.

use std::path::Path;

use toolrelay_config::AppConfig;

use super::load_config;

const MASK: &str = "********";

pub async fn show(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = masked(load_config(path)?);
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn init(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

pub async fn path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", path.display());
    Ok(())
}

/// Replace secrets before printing.
fn masked(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    if config.retrieval.api_key.is_some() {
        config.retrieval.api_key = Some(MASK.into());
    }
    for server in &mut config.tool_servers {
        for value in server.env.values_mut() {
            *value = MASK.into();
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-live-123".into());
        config.retrieval.api_key = Some("sk-rerank".into());
        let rendered = toml::to_string_pretty(&masked(config)).unwrap();
        assert!(!rendered.contains("sk-live-123"));
        assert!(!rendered.contains("sk-rerank"));
        assert!(rendered.contains(MASK));
    }

    #[tokio::test]
    async fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init(&path, false).await.unwrap();
        let written = AppConfig::load_from(&path).unwrap();
        assert_eq!(written.model, AppConfig::default().model);

        assert!(init(&path, false).await.is_err());
        init(&path, true).await.unwrap();
    }
}

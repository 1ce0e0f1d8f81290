//! `toolrelay tools`: List the tools each configured server offers.

use std::path::Path;

use super::load_config;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    if config.tool_servers.is_empty() {
        println!("No tool servers configured.");
        println!("Add [[tool_servers]] entries to {}", config_path.display());
        return Ok(());
    }

    let providers = toolrelay_tools::providers_from_config(&config.tool_servers);
    let mut failures = 0usize;

    for provider in &providers {
        println!();
        println!("  {}", provider.name());

        let listed = match provider.init().await {
            Ok(()) => provider.list_tools().await,
            Err(e) => Err(e),
        };
        match listed {
            Ok(tools) if tools.is_empty() => println!("    (no tools)"),
            Ok(tools) => {
                for tool in tools {
                    let summary = tool.description.lines().next().unwrap_or("");
                    println!("    {:<24} {summary}", tool.name);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("    [Error] {e}");
            }
        }
        provider.close().await;
    }
    println!();

    if failures == providers.len() {
        return Err("No tool server could be reached".into());
    }
    Ok(())
}

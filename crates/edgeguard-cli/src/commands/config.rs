//! Configuration display.

use anyhow::Result;
use edgeguard_config::EdgeguardConfig;

/// Show the effective configuration.
pub fn show(config: &EdgeguardConfig, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        "toml" => println!("{}", config.to_toml()?),
        _ => {
            println!("Edgeguard Configuration");
            println!("=======================\n");

            println!("Engine:");
            println!("  Index strategy: {:?}", config.engine.index_strategy);
            println!(
                "  Invalidate service cache: {}",
                config.engine.invalidate_service_cache
            );
            println!();

            println!("Selector:");
            println!("  Max tokens: {}", config.selector.max_tokens);
            println!();

            println!("Logging:");
            println!("  Filter: {}", config.logging.filter);
            println!();

            println!("Advisor:");
            println!("  Model: {}", config.advisor.model.display());
        }
    }
    Ok(())
}

//! `streamchat config`: Configuration management commands.

use streamchat_config::AppConfig;

/// Non-fatal findings about a config that otherwise loads.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.has_api_key() {
        warnings.push("No API key set (set STREAMCHAT_API_KEY or OPENAI_API_KEY)".to_string());
    }

    let p = &config.pipeline;
    if p.staleness_threshold_ms <= p.generation_timeout_ms {
        warnings.push(format!(
            "staleness_threshold_ms ({}) <= generation_timeout_ms ({}): a retry can never finish in time",
            p.staleness_threshold_ms, p.generation_timeout_ms
        ));
    }

    if config.generation.history_limit > p.context_window_size {
        warnings.push(format!(
            "history_limit ({}) exceeds context_window_size ({}); prompts will hold at most {} entries",
            config.generation.history_limit, p.context_window_size, p.context_window_size
        ));
    }

    warnings
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Bot:       {}", config.bot_username);
            println!("   Provider:  {}", config.generation.provider);
            println!("   Model:     {}", config.generation.model);
            println!("   Providers: {}", config.providers.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

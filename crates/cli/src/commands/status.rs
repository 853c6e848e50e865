//! `streamchat status`: Show system status.

use streamchat_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let p = &config.pipeline;

    println!("streamchat Status");
    println!("=================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Bot name:     {}", config.bot_username);
    println!("  Provider:     {}", config.generation.provider);
    println!("  Model:        {}", config.generation.model);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Prefix:       {}", p.command_prefix);
    println!("  Respond to:   {:?}", p.respond_to);
    println!("  Queue:        {} events, {:?}", p.queue_capacity, p.queue_shed_policy);
    println!("  Context:      {} entries per channel", p.context_window_size);
    println!("  Workers:      {}", p.workers);
    println!(
        "  Generation:   {}/s, {}ms timeout, {} retr{}",
        p.generation_rate_limit,
        p.generation_timeout_ms,
        p.generation_max_retries,
        if p.generation_max_retries == 1 { "y" } else { "ies" }
    );
    println!("  Stale after:  {}ms", p.staleness_threshold_ms);

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file: run `streamchat onboard` first");
    }

    Ok(())
}

//! `streamchat run`: start the pipeline on the console connector.

use std::sync::Arc;
use std::time::Duration;

use streamchat_channels::{ChannelRegistry, ConsoleChannel};
use streamchat_config::AppConfig;
use streamchat_pipeline::{CommandDispatcher, Pipeline, register_builtins};
use tracing::{info, warn};

pub async fn run(
    channel: String,
    workers: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(workers) = workers {
        config.pipeline.workers = workers;
        config.validate()?;
    }

    if !config.has_api_key() {
        warn!(
            provider = %config.generation.provider,
            "No API key configured; generated replies will fail until one is set"
        );
    }

    let router = streamchat_providers::build_from_config(&config);
    let provider = router.default().ok_or_else(|| {
        format!(
            "Provider '{}' is not configured",
            config.generation.provider
        )
    })?;

    let mut dispatcher =
        CommandDispatcher::new(&config.pipeline.command_prefix, &config.bot_username);
    register_builtins(&mut dispatcher)?;

    let mut registry = ChannelRegistry::new();
    registry.register(Arc::new(ConsoleChannel::new(
        &config.bot_username,
        channel.clone(),
    )));
    let registry = Arc::new(registry);

    let pipeline = Pipeline::new(&config, dispatcher, provider, registry.clone());
    let events = registry.start_all().await?;

    let mut intake = pipeline.spawn_intake(events);
    let workers = pipeline.spawn_workers(config.pipeline.workers);
    let reaper = pipeline.spawn_reaper(
        config.pipeline.reap_interval(),
        config.pipeline.idle_timeout(),
    );
    let stats =
        pipeline.spawn_stats_logger(Duration::from_secs(config.logging.stats_interval_secs));

    println!("streamchat is live as {} in {channel}", config.bot_username);
    println!(
        "   Provider: {} ({})",
        config.generation.provider, config.generation.model
    );
    println!(
        "   Commands: {}",
        pipeline
            .dispatcher()
            .triggers()
            .iter()
            .map(|t| format!("{}{t}", config.pipeline.command_prefix))
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!("   Type `#channel @user[:mod] message`, `/follow user`, `/sub user 3`, `/raid user 50`, or `quit`.\n");

    info!(
        workers = config.pipeline.workers,
        queue_capacity = config.pipeline.queue_capacity,
        "Pipeline started"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
        _ = &mut intake => info!("Console closed, shutting down"),
    }

    intake.abort();
    pipeline.shutdown(workers).await;
    registry.stop_all().await;
    for task in [reaper, stats].into_iter().flatten() {
        task.abort();
    }

    Ok(())
}

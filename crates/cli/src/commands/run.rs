//! `palaver run` — Start the transport and the turn pipeline.

use palaver_channels::{AuditReporter, TelegramConfig, TelegramTransport};
use palaver_config::AppConfig;
use palaver_core::event::EventBus;
use palaver_core::generator::Generator;
use palaver_core::search::SearchBackend;
use palaver_core::store::SessionStore;
use palaver_core::transport::Transport;
use palaver_engine::{EnrichmentPipeline, HistoryManager, TurnOrchestrator, VerificationDetector};
use palaver_providers::ChatCompletionsClient;
use palaver_search::{DuckDuckGoSearch, NoSearch};
use palaver_store::{InMemoryStore, RedisStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn run(
    config_path: Option<PathBuf>,
    store_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    let mut config = AppConfig::load_with_env(&path)?;

    if let Some(backend) = store_override {
        config.store.backend = backend;
        config.validate()?;
    }

    let Some(bot_token) = config.telegram.bot_token.clone() else {
        return Err("No bot token configured. Set telegram.bot_token or PALAVER_BOT_TOKEN.".into());
    };
    let Some(api_key) = config.generation.api_key.clone() else {
        return Err("No API key configured. Set generation.api_key or PALAVER_API_KEY.".into());
    };

    println!("💬 Palaver — starting");
    println!("   Store:  {}", config.store.backend);
    println!("   Model:  {}", config.generation.model);
    println!(
        "   Search: {}",
        if config.enrichment.trigger_keywords.is_empty() {
            "disabled"
        } else {
            "duckduckgo"
        }
    );
    println!(
        "   Audit:  {}",
        if config.audit.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    // ── Collaborators ──────────────────────────────────────────────────────

    let store: Arc<dyn SessionStore> = match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        _ => Arc::new(RedisStore::connect(&config.store.redis_url).await?),
    };
    info!(backend = store.name(), "Session store ready");

    let generator: Arc<dyn Generator> = Arc::new(
        ChatCompletionsClient::new(
            "chat-completions",
            &config.generation.api_url,
            api_key,
            &config.generation.model,
        )
        .with_timeout(Duration::from_secs(config.generation.timeout_secs)),
    );

    let search: Arc<dyn SearchBackend> = if config.enrichment.trigger_keywords.is_empty() {
        Arc::new(NoSearch)
    } else {
        Arc::new(DuckDuckGoSearch::new())
    };

    let event_bus = Arc::new(EventBus::default());
    if config.audit.enabled {
        match (config.audit.bot_token.clone(), config.audit.chat_id.clone()) {
            (Some(token), Some(chat_id)) => {
                let reporter_transport = Arc::new(TelegramTransport::new(TelegramConfig {
                    bot_token: token,
                    ..TelegramConfig::default()
                }));
                AuditReporter::new(reporter_transport, chat_id).spawn(&event_bus);
                info!("Audit reporter active");
            }
            _ => warn!("Audit enabled but bot token or chat id is missing; reporter disabled"),
        }
    }

    // ── Engine ─────────────────────────────────────────────────────────────

    let history = HistoryManager::new(
        store,
        &config.session.system_instruction,
        config.session.max_history,
        config.session.ttl(),
    );
    let detector = VerificationDetector::new(&config.session.unlock_token);
    let enrichment = EnrichmentPipeline::new(search)
        .with_time_format(&config.enrichment.time_format)
        .with_utc_offset_minutes(config.enrichment.utc_offset_minutes)
        .with_trigger_keywords(config.enrichment.trigger_keywords.clone())
        .with_search_limits(
            config.enrichment.search_max_results,
            Duration::from_secs(config.enrichment.search_timeout_secs),
        );
    let orchestrator = Arc::new(
        TurnOrchestrator::new(history, detector, enrichment, generator, event_bus)
            .with_max_tokens(config.generation.max_tokens)
            .with_temperature(config.generation.temperature)
            .with_fallback_reply(&config.generation.fallback_reply),
    );

    // ── Transport ──────────────────────────────────────────────────────────

    let transport = Arc::new(TelegramTransport::new(TelegramConfig {
        bot_token,
        poll_timeout: Duration::from_secs(config.telegram.poll_timeout_secs),
        ..TelegramConfig::default()
    }));
    let mut inbound = transport.start().await?;

    info!("Palaver running. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            item = inbound.recv() => {
                let Some(item) = item else {
                    warn!("Transport stream ended");
                    break;
                };
                let message = match item {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "Transport error");
                        continue;
                    }
                };

                // Commands are answered by the runner; the engine only ever
                // sees free text.
                let command = message.text.split_whitespace().next().unwrap_or("");
                let canned = match command {
                    "/start" => Some(config.telegram.greeting.clone()),
                    "/help" => Some(config.telegram.help_text.clone()),
                    _ => None,
                };
                if let Some(reply) = canned {
                    let transport = Arc::clone(&transport);
                    tokio::spawn(async move {
                        if let Err(e) = transport.send(&message.chat_id, &reply).await {
                            warn!(error = %e, "Command reply failed");
                        }
                    });
                    continue;
                }

                // One task per message; the per-user gate inside the engine
                // keeps same-user turns ordered.
                let orchestrator = Arc::clone(&orchestrator);
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    if let Err(e) = transport.send_typing(&message.chat_id).await {
                        debug!(error = %e, "Typing indicator failed");
                    }
                    let reply = orchestrator.handle(&message).await;
                    if let Err(e) = transport.send(&message.chat_id, &reply.text).await {
                        warn!(error = %e, chat_id = %message.chat_id, "Reply delivery failed");
                    }
                });
            }
        }
    }

    transport.stop().await?;
    info!("Palaver stopped");
    Ok(())
}

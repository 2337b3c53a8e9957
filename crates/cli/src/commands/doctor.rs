//! `palaver doctor` — Diagnose configuration and collaborator health.

use palaver_channels::{TelegramConfig, TelegramTransport};
use palaver_config::AppConfig;
use palaver_core::generator::Generator;
use palaver_core::store::SessionStore;
use palaver_core::transport::Transport;
use palaver_providers::ChatCompletionsClient;
use palaver_store::RedisStore;
use std::time::Duration;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Palaver Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file present: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file (using defaults) — run `palaver init` to create one");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the config before running.");
            return Ok(());
        }
    };

    // Secrets
    if config.has_bot_token() {
        println!("  ✅ Bot token configured");
    } else {
        println!("  ⚠️  No bot token — set telegram.bot_token or PALAVER_BOT_TOKEN");
        issues += 1;
    }
    if config.has_api_key() {
        println!("  ✅ Generation API key configured");
    } else {
        println!("  ⚠️  No API key — set generation.api_key or PALAVER_API_KEY");
        issues += 1;
    }

    // Store
    match config.store.backend.as_str() {
        "memory" => println!("  ✅ Store: in-memory (nothing to probe)"),
        _ => match RedisStore::connect(&config.store.redis_url).await {
            Ok(store) => match store.health_check().await {
                Ok(true) => println!("  ✅ Redis reachable"),
                _ => {
                    println!("  ❌ Redis ping failed");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ Redis unreachable: {e}");
                issues += 1;
            }
        },
    }

    // Generation backend
    if let Some(api_key) = &config.generation.api_key {
        let client = ChatCompletionsClient::new(
            "chat-completions",
            &config.generation.api_url,
            api_key.clone(),
            &config.generation.model,
        )
        .with_timeout(Duration::from_secs(10));
        match client.health_check().await {
            Ok(true) => println!("  ✅ Generation backend reachable"),
            Ok(false) => {
                println!("  ❌ Generation backend rejected the probe");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Generation backend unreachable: {e}");
                issues += 1;
            }
        }
    }

    // Transport
    if let Some(token) = &config.telegram.bot_token {
        let transport = TelegramTransport::new(TelegramConfig {
            bot_token: token.clone(),
            ..TelegramConfig::default()
        });
        match transport.health_check().await {
            Ok(true) => println!("  ✅ Telegram bot token accepted (getMe)"),
            Ok(false) => {
                println!("  ❌ Telegram getMe failed");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Telegram unreachable: {e}");
                issues += 1;
            }
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

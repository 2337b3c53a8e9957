//! Telegram transport — Bot API long polling.
//!
//! Connects to the Telegram Bot API over HTTPS: `getUpdates` long polling
//! for inbound traffic, `sendMessage` / `sendChatAction` for outbound.
//! Long polling keeps deployment to a single outbound connection; no
//! webhook mode, no public endpoint.

use async_trait::async_trait;
use palaver_core::error::TransportError;
use palaver_core::session::UserId;
use palaver_core::transport::{InboundMessage, Transport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Delay before retrying after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Telegram transport configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// API base URL (override for tests or a local Bot API server).
    pub api_base: String,
    /// Long-poll window. The HTTP client timeout is derived from this.
    pub poll_timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org".into(),
            poll_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Telegram transport adapter.
pub struct TelegramTransport {
    config: TelegramConfig,
    client: reqwest::Client,
    running: Arc<AtomicBool>,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig) -> Self {
        // The HTTP timeout must outlast the long-poll window, or every idle
        // poll dies as a client-side timeout.
        let timeout = config.poll_timeout + Duration::from_secs(10);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            client,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Call a Bot API method and unwrap the response envelope.
    ///
    /// Returns the failure reason as a string; callers map it into the
    /// `TransportError` variant that fits their operation.
    async fn invoke<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> std::result::Result<T, String> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{method} returned HTTP {status}: {body}"));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse {method} response: {e}"))?;

        if !envelope.ok {
            return Err(envelope
                .description
                .unwrap_or_else(|| format!("{method} rejected without description")));
        }

        envelope
            .result
            .ok_or_else(|| format!("{method} response has no result"))
    }

    async fn poll_loop(self, tx: mpsc::Sender<std::result::Result<InboundMessage, TransportError>>) {
        let mut offset: i64 = 0;

        while self.running.load(Ordering::SeqCst) {
            let payload = serde_json::json!({
                "offset": offset,
                "timeout": self.config.poll_timeout.as_secs(),
                "allowed_updates": ["message"],
            });

            let updates = match self.invoke::<Vec<ApiUpdate>>("getUpdates", &payload).await {
                Ok(updates) => updates,
                Err(reason) => {
                    warn!(reason = %reason, "Update poll failed");
                    if tx
                        .send(Err(TransportError::ConnectionLost(reason)))
                        .await
                        .is_err()
                    {
                        break; // receiver dropped, nobody left to serve
                    }
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(inbound) = update.into_inbound() else {
                    continue;
                };
                debug!(
                    user_id = %inbound.user_id.0,
                    chat_id = %inbound.chat_id,
                    "Inbound message"
                );
                if tx.send(Ok(inbound)).await.is_err() {
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }

        debug!("Update polling stopped");
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(
        &self,
    ) -> std::result::Result<
        mpsc::Receiver<std::result::Result<InboundMessage, TransportError>>,
        TransportError,
    > {
        if self.config.bot_token.is_empty() {
            return Err(TransportError::NotConfigured(
                "Telegram bot token is empty".into(),
            ));
        }

        let (tx, rx) = mpsc::channel(64);
        self.running.store(true, Ordering::SeqCst);

        let worker = Self {
            config: self.config.clone(),
            client: self.client.clone(),
            running: Arc::clone(&self.running),
        };
        tokio::spawn(worker.poll_loop(tx));

        info!(
            poll_timeout_secs = self.config.poll_timeout.as_secs(),
            "Telegram long polling started"
        );
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, text: &str) -> std::result::Result<(), TransportError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.invoke::<ApiMessage>("sendMessage", &payload)
            .await
            .map_err(|reason| TransportError::DeliveryFailed {
                chat_id: chat_id.to_string(),
                reason,
            })?;
        debug!(chat_id = %chat_id, text_len = text.len(), "Reply delivered");
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> std::result::Result<(), TransportError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing",
        });
        // sendChatAction's result is a bare boolean, not a message object
        self.invoke::<bool>("sendChatAction", &payload)
            .await
            .map_err(|reason| TransportError::DeliveryFailed {
                chat_id: chat_id.to_string(),
                reason,
            })?;
        Ok(())
    }

    async fn stop(&self) -> std::result::Result<(), TransportError> {
        // The in-flight poll finishes its window before the loop observes
        // the flag.
        self.running.store(false, Ordering::SeqCst);
        info!("Telegram transport stopping");
        Ok(())
    }

    async fn health_check(&self) -> std::result::Result<bool, TransportError> {
        if self.config.bot_token.is_empty() {
            return Ok(false);
        }
        match self.invoke::<ApiUser>("getMe", &serde_json::json!({})).await {
            Ok(me) => {
                debug!(bot = ?me.display_name(), "Bot identity confirmed");
                Ok(true)
            }
            Err(reason) => {
                warn!(reason = %reason, "getMe failed");
                Ok(false)
            }
        }
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUpdate {
    update_id: i64,
    message: Option<ApiMessage>,
}

impl ApiUpdate {
    /// Updates without a text message or a sender (stickers, edits, channel
    /// posts) are skipped.
    fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let from = message.from?;
        Some(InboundMessage {
            user_id: UserId(from.id.to_string()),
            chat_id: message.chat.id.to_string(),
            sender_name: from.display_name(),
            text,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    from: Option<ApiUser>,
    chat: ApiChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: i64,
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

impl ApiUser {
    /// "First Last" when set, falling back to the @username.
    fn display_name(&self) -> Option<String> {
        let name = match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        };
        let name = name.trim().to_string();
        if !name.is_empty() {
            return Some(name);
        }
        self.username.as_ref().map(|u| format!("@{u}"))
    }
}

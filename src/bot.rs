use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::platform::telegram::TelegramClient;
use crate::platform::{IncomingMessage, OutboundPayload, Update};

/// Produces the reply for one inbound message.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, message: &IncomingMessage, chat_id: i64) -> Result<OutboundPayload>;
}

/// Handler backed by a plain closure. Build one with [`handler_fn`].
pub struct FnHandler<F>(F);

/// Wrap a synchronous closure as a [`CommandHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&IncomingMessage, i64) -> Result<OutboundPayload> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&IncomingMessage, i64) -> Result<OutboundPayload> + Send + Sync,
{
    async fn handle(&self, message: &IncomingMessage, chat_id: i64) -> Result<OutboundPayload> {
        (self.0)(message, chat_id)
    }
}

/// What to do with a webhook body that cannot be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Log and stop; no handler runs.
    #[default]
    Reject,
    /// Carry on with an empty message (chat id 0, no text), so the fallback runs.
    ZeroValue,
}

impl std::str::FromStr for DecodePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "zero_value" | "zero-value" | "zerovalue" => Ok(Self::ZeroValue),
            other => anyhow::bail!("unknown decode policy '{}'", other),
        }
    }
}

/// Which failures the user hears about. Defaults keep the quiet behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FailurePolicy {
    /// Tell the user when a command handler fails (otherwise only logged).
    pub report_command_errors: bool,
    /// Send one error notice when the fallback reply fails (otherwise ignored).
    pub report_fallback_send_errors: bool,
    pub decode: DecodePolicy,
}

/// Routes inbound messages to registered handlers and relays their replies.
///
/// Registration takes `&mut self`, so every command must be registered before
/// the dispatcher is shared with the server.
pub struct Dispatcher {
    client: TelegramClient,
    commands: HashMap<String, Arc<dyn CommandHandler>>,
    fallback: Option<Arc<dyn CommandHandler>>,
    policy: FailurePolicy,
}

impl Dispatcher {
    pub fn new(client: TelegramClient) -> Self {
        Self {
            client,
            commands: HashMap::new(),
            fallback: None,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register `handler` for messages whose text equals `command` exactly.
    /// A later registration for the same text replaces the earlier one.
    pub fn register_command(
        &mut self,
        command: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) {
        let command = command.into();
        if self
            .commands
            .insert(command.clone(), Arc::new(handler))
            .is_some()
        {
            warn!("Handler for command '{}' replaced", command);
        } else {
            info!("Registered command: {}", command);
        }
    }

    /// Register the handler for text that matches no command, replacing any previous one.
    pub fn register_fallback(&mut self, handler: impl CommandHandler + 'static) {
        self.fallback = Some(Arc::new(handler));
        info!("Registered fallback handler");
    }

    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Handle one webhook body. Never fails: problems are logged or reported
    /// to the chat according to the [`FailurePolicy`].
    pub async fn handle_update(&self, body: &[u8]) {
        let message = match serde_json::from_slice::<Update>(body) {
            Ok(Update {
                message: Some(message),
            }) => message,
            Ok(Update { message: None }) => match self.policy.decode {
                DecodePolicy::Reject => {
                    debug!("Ignoring update without a message");
                    return;
                }
                DecodePolicy::ZeroValue => IncomingMessage::default(),
            },
            Err(e) => match self.policy.decode {
                DecodePolicy::Reject => {
                    error!("Error occurred decoding message body: {}", e);
                    return;
                }
                DecodePolicy::ZeroValue => {
                    error!(
                        "Error occurred decoding message body, continuing with empty message: {}",
                        e
                    );
                    IncomingMessage::default()
                }
            },
        };

        self.dispatch(&message).await;
    }

    /// Run exactly one handler for `message` and relay what it produced.
    pub async fn dispatch(&self, message: &IncomingMessage) {
        let chat_id = message.chat_id();
        debug!(
            "Message from {} ({}) in ChatID:{}: {}",
            message.from.username, message.from.id, chat_id, message.text
        );

        match self.commands.get(&message.text) {
            Some(handler) => self.run_command(handler, message, chat_id).await,
            None => self.run_fallback(message, chat_id).await,
        }
    }

    async fn run_command(
        &self,
        handler: &Arc<dyn CommandHandler>,
        message: &IncomingMessage,
        chat_id: i64,
    ) {
        let payload = match handler.handle(message, chat_id).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    "An error occurred while attempting to retrieve an answer for the user: {:#}",
                    e
                );
                if self.policy.report_command_errors {
                    let notice = OutboundPayload::new(
                        chat_id,
                        format!("an error occurred while attempting to retrieve an answer: {}", e),
                    );
                    self.send_best_effort(chat_id, &notice).await;
                }
                return;
            }
        };

        self.relay(chat_id, &payload).await;
    }

    async fn run_fallback(&self, message: &IncomingMessage, chat_id: i64) {
        let Some(fallback) = self.fallback.as_ref() else {
            warn!(
                "No fallback handler registered; dropping message for ChatID:{}",
                chat_id
            );
            return;
        };

        let payload = match fallback.handle(message, chat_id).await {
            Ok(payload) => payload,
            Err(e) => {
                let not_found = OutboundPayload::new(
                    chat_id,
                    format!("unable to find a response for {}", message.text),
                );
                self.send_best_effort(chat_id, &not_found).await;
                error!("Unable to find response function: {:#}", e);
                return;
            }
        };

        if self.policy.report_fallback_send_errors {
            self.relay(chat_id, &payload).await;
        } else {
            self.send_best_effort(chat_id, &payload).await;
        }
    }

    /// Send `payload`; if that fails, tell the user what went wrong once.
    async fn relay(&self, chat_id: i64, payload: &OutboundPayload) {
        if let Err(e) = self.client.send(chat_id, payload).await {
            error!("SendResponse error: {}", e);
            let notice = OutboundPayload::new(chat_id, format!("SendResponse error: {}", e));
            self.send_best_effort(chat_id, &notice).await;
        }
    }

    async fn send_best_effort(&self, chat_id: i64, payload: &OutboundPayload) {
        if let Err(e) = self.client.send(chat_id, payload).await {
            debug!("Ignoring delivery failure for ChatID:{}: {}", chat_id, e);
        }
    }
}

/// Holds the process-wide dispatcher and guarantees it is built only once,
/// even when several tasks ask for it at the same time.
#[derive(Default)]
pub struct DispatcherCell {
    inner: OnceLock<Arc<Dispatcher>>,
}

impl DispatcherCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> Dispatcher) -> Arc<Dispatcher> {
        self.inner
            .get_or_init(|| {
                let dispatcher = init();
                info!("Dispatcher created");
                Arc::new(dispatcher)
            })
            .clone()
    }
}

/// Webhook and health routes backed by `dispatcher`.
pub fn router(dispatcher: Arc<Dispatcher>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(webhook))
        .route("/healthz", get(healthz))
        .with_state(dispatcher)
}

async fn webhook(State(dispatcher): State<Arc<Dispatcher>>, body: Bytes) -> StatusCode {
    dispatcher.handle_update(&body).await;
    StatusCode::OK
}

async fn healthz() -> &'static str {
    "ok"
}

/// Serve the webhook until Ctrl-C.
pub async fn run(dispatcher: Arc<Dispatcher>, port: u16, webhook_path: &str) -> Result<()> {
    let app = router(dispatcher, webhook_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening for webhooks on {}{}", addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

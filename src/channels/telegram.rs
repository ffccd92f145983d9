//! Per-user Telegram bot lifecycle
//!
//! Every user brings their own bot token, so the manager runs one polling
//! dispatcher per user and owns the only shared mutable state in the system:
//! the session registry. Invariants:
//! - one session per user, enforced by an in-flight launch marker
//! - sessions are registered before polling starts, because dispatch only
//!   resolves when the connection ends
//! - a restart stops the old session and waits a fixed drain delay before
//!   connecting again, so Telegram sees the old poller go away first
//! - a polling conflict (another instance holds the same token) deregisters
//!   the session and is never retried automatically

use crate::db::Database;
use crate::dispatcher::MessageDispatcher;
use crate::memory::IdentityStore;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::ShutdownToken;
use teloxide::error_handlers::ErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup, ReplyMarkup};
use teloxide::update_listeners;
use teloxide::ApiError;
use teloxide::RequestError;

/// How long to let Telegram drain the previous connection before relaunching
const RESTART_DRAIN_DELAY: Duration = Duration::from_secs(1);

/// A live bot connection for one user
struct BotSession {
    bot: Bot,
    shutdown: ShutdownToken,
    /// Token tail for logs; never log the full token
    token_tail: String,
}

/// Dependencies injected into the message handler via dptree
struct BotCtx {
    user_id: String,
    db: Arc<Database>,
    dispatcher: Arc<MessageDispatcher>,
    identities: Arc<IdentityStore>,
}

pub struct TelegramManager {
    sessions: Arc<DashMap<String, BotSession>>,
    launching: DashMap<String, ()>,
    db: Arc<Database>,
    dispatcher: Arc<MessageDispatcher>,
    identities: Arc<IdentityStore>,
}

impl TelegramManager {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Arc<MessageDispatcher>,
        identities: Arc<IdentityStore>,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            launching: DashMap::new(),
            db,
            dispatcher,
            identities,
        }
    }

    /// Relaunch every active integration at boot. Each bot starts in its own
    /// task so one bad token cannot block the others or the HTTP server.
    pub fn initialize_from_storage(self: &Arc<Self>) {
        let integrations = match self.db.list_active_telegram_integrations() {
            Ok(list) => list,
            Err(e) => {
                log::error!("Failed to load Telegram integrations: {}", e);
                return;
            }
        };

        log::info!("Restoring {} Telegram bot(s) from storage", integrations.len());
        for integration in integrations {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = manager
                    .start_bot(&integration.user_id, &integration.bot_token)
                    .await
                {
                    log::error!(
                        "Failed to restore Telegram bot for user {}: {}",
                        integration.user_id,
                        e
                    );
                }
            });
        }
    }

    /// Start (or restart) the user's bot. A call while another launch for the
    /// same user is in flight is an idempotent skip, not an error.
    pub async fn start_bot(&self, user_id: &str, bot_token: &str) -> Result<(), String> {
        if !self.begin_launch(user_id) {
            log::info!(
                "Bot launch for user {} already in progress; skipping duplicate start",
                user_id
            );
            return Ok(());
        }

        let result = self.launch(user_id, bot_token).await;
        self.end_launch(user_id);
        result
    }

    async fn launch(&self, user_id: &str, bot_token: &str) -> Result<(), String> {
        if self.stop_bot(user_id).await {
            tokio::time::sleep(RESTART_DRAIN_DELAY).await;
        }

        let bot = Bot::new(bot_token);
        let ctx = Arc::new(BotCtx {
            user_id: user_id.to_string(),
            db: self.db.clone(),
            dispatcher: self.dispatcher.clone(),
            identities: self.identities.clone(),
        });

        let mut dispatcher = Dispatcher::builder(
            bot.clone(),
            Update::filter_message().endpoint(handle_message),
        )
        .dependencies(dptree::deps![ctx])
        .default_handler(|_| async {})
        .build();

        let token_tail = tail(bot_token);
        // Register before polling starts: dispatch only resolves when the
        // connection ends, so callers must not wait for it
        self.sessions.insert(
            user_id.to_string(),
            BotSession {
                bot: bot.clone(),
                shutdown: dispatcher.shutdown_token(),
                token_tail: token_tail.clone(),
            },
        );
        log::info!("Starting Telegram bot ...{} for user {}", token_tail, user_id);

        let sessions = self.sessions.clone();
        let owner = user_id.to_string();
        tokio::spawn(async move {
            let listener = update_listeners::polling_default(bot).await;
            let watcher = Arc::new(ConflictWatcher {
                user_id: owner.clone(),
                sessions: sessions.clone(),
            });
            dispatcher.dispatch_with_listener(listener, watcher).await;
            sessions.remove(&owner);
            log::info!("Telegram bot for user {} stopped", owner);
        });

        Ok(())
    }

    /// Stop the user's bot if one is registered; returns whether it was
    pub async fn stop_bot(&self, user_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(user_id) else {
            return false;
        };

        log::info!(
            "Stopping Telegram bot ...{} for user {}",
            session.token_tail,
            user_id
        );
        match session.shutdown.shutdown() {
            Ok(wait) => wait.await,
            Err(e) => log::debug!("Bot for user {} was not dispatching: {}", user_id, e),
        }
        true
    }

    /// Stop every registered bot, used on server shutdown
    pub async fn shutdown_all(&self) {
        let user_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for user_id in user_ids {
            self.stop_bot(&user_id).await;
        }
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Proactive delivery to the chat the user last talked to their bot from.
    /// Best-effort: without a running bot or a learned chat there is nothing
    /// to do but warn.
    pub async fn notify(&self, user_id: &str, text: &str) {
        let bot = match self.sessions.get(user_id) {
            Some(session) => session.bot.clone(),
            None => {
                log::warn!("No running Telegram bot for user {}; dropping notification", user_id);
                return;
            }
        };

        let chat_id = self
            .db
            .get_telegram_integration(user_id)
            .ok()
            .flatten()
            .and_then(|i| i.chat_id)
            .and_then(|c| c.parse::<i64>().ok());

        let Some(chat_id) = chat_id else {
            log::warn!(
                "User {} has no Telegram chat bound yet; dropping notification",
                user_id
            );
            return;
        };

        if let Err(e) = bot.send_message(ChatId(chat_id), text).await {
            log::error!("Failed to deliver Telegram notification to user {}: {}", user_id, e);
        }
    }

    fn begin_launch(&self, user_id: &str) -> bool {
        self.launching.insert(user_id.to_string(), ()).is_none()
    }

    fn end_launch(&self, user_id: &str) {
        self.launching.remove(user_id);
    }
}

/// Stops and deregisters the session when Telegram reports that another
/// connection took over the token
struct ConflictWatcher {
    user_id: String,
    sessions: Arc<DashMap<String, BotSession>>,
}

impl ErrorHandler<RequestError> for ConflictWatcher {
    fn handle_error(self: Arc<Self>, error: RequestError) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            match error {
                RequestError::Api(ApiError::TerminatedByOtherGetUpdates) => {
                    log::error!(
                        "Telegram conflict for user {}: another instance is polling this bot; deregistering session",
                        self.user_id
                    );
                    // The polling listener keeps running after an error, so
                    // removing the registry entry is not enough: the dispatcher
                    // must be shut down or it lives on as a zombie poller
                    if let Some((_, session)) = self.sessions.remove(&self.user_id) {
                        if let Err(e) = session.shutdown.shutdown() {
                            log::debug!(
                                "Conflicted bot for user {} was not dispatching: {}",
                                self.user_id,
                                e
                            );
                        }
                    }
                }
                e => log::error!("Telegram polling error for user {}: {}", self.user_id, e),
            }
        })
    }
}

async fn handle_message(bot: Bot, msg: Message, ctx: Arc<BotCtx>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    if text.trim() == "/start" {
        // Bind the chat so reminders and summaries know where to go
        if let Err(e) = ctx.db.set_telegram_chat_id(&ctx.user_id, &chat_id.to_string()) {
            log::error!("Failed to store chat id for user {}: {}", ctx.user_id, e);
        }
        let identity = ctx.identities.get(&ctx.user_id);
        bot.send_message(chat_id, identity.greeting).await?;
        return Ok(());
    }

    let conversation_id = format!("telegram:{}", chat_id);
    let result = ctx
        .dispatcher
        .dispatch(&ctx.user_id, &conversation_id, text)
        .await;

    let mut request = bot.send_message(chat_id, result.response);
    if !result.options.is_empty() {
        let buttons: Vec<KeyboardButton> = result
            .options
            .iter()
            .map(|o| KeyboardButton::new(o.clone()))
            .collect();
        let keyboard = KeyboardMarkup::new([buttons])
            .resize_keyboard(true)
            .one_time_keyboard(true);
        request = request.reply_markup(ReplyMarkup::Keyboard(keyboard));
    }
    request.await?;

    Ok(())
}

fn tail(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::auth::AdminList;
use crate::clock::Clock;
use crate::command::{CallbackAction, CommandError, TextCommand};
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{UPDATE_DURATION_SECONDS, UPDATES_TOTAL, command_label};
use crate::queue::{IdentityQueue, QueueError};
use crate::render;
use crate::session::{ExpiringStore, SessionValue, last_selection_key, menu_edit_key};
use crate::transport::{OutgoingMessage, Transport, TransportError, Update, UpdateKind};

#[derive(Debug)]
pub enum DispatchError {
    Engine(EngineError),
    Command(CommandError),
    Transport(TransportError),
    Queue(QueueError),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Engine(e) => write!(f, "{e}"),
            DispatchError::Command(e) => write!(f, "{e}"),
            DispatchError::Transport(e) => write!(f, "{e}"),
            DispatchError::Queue(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Engine(e) => Some(e),
            DispatchError::Command(e) => Some(e),
            DispatchError::Transport(e) => Some(e),
            DispatchError::Queue(e) => Some(e),
        }
    }
}

impl From<EngineError> for DispatchError {
    fn from(e: EngineError) -> Self {
        DispatchError::Engine(e)
    }
}

impl From<CommandError> for DispatchError {
    fn from(e: CommandError) -> Self {
        DispatchError::Command(e)
    }
}

impl From<TransportError> for DispatchError {
    fn from(e: TransportError) -> Self {
        DispatchError::Transport(e)
    }
}

impl From<QueueError> for DispatchError {
    fn from(e: QueueError) -> Self {
        DispatchError::Queue(e)
    }
}

/// How long each kind of session entry lives.
#[derive(Debug, Clone, Copy)]
pub struct SessionTtls {
    pub menu_edit: Duration,
    pub selection: Duration,
}

impl Default for SessionTtls {
    fn default() -> Self {
        Self {
            menu_edit: Duration::from_secs(30),
            selection: Duration::from_secs(60),
        }
    }
}

/// Turns chat updates into engine calls and replies.
///
/// Every update runs as one unit of work on the sender's queue, so two
/// presses from the same user are handled strictly in arrival order.
pub struct Dispatcher {
    engine: Arc<Engine>,
    sessions: Arc<ExpiringStore<SessionValue>>,
    queue: IdentityQueue<UserId>,
    admins: AdminList,
    clock: Arc<dyn Clock>,
    ttls: SessionTtls,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<Engine>,
        sessions: Arc<ExpiringStore<SessionValue>>,
        admins: AdminList,
        clock: Arc<dyn Clock>,
        ttls: SessionTtls,
    ) -> Self {
        Self {
            engine,
            sessions,
            queue: IdentityQueue::new(),
            admins,
            clock,
            ttls,
        }
    }

    /// Queue `update` under its sender. Returns once admitted.
    pub async fn dispatch(
        self: &Arc<Self>,
        update: Update,
        transport: Arc<dyn Transport>,
    ) -> Result<JoinHandle<()>, DispatchError> {
        let this = Arc::clone(self);
        let identity = update.sender.id;
        let handle = self
            .queue
            .process(identity, async move {
                let label = command_label(&update.kind);
                let started = Instant::now();
                let status = match this.handle(&update, transport.as_ref()).await {
                    Ok(()) => "ok",
                    Err(e) => {
                        error!(user = identity, command = label, "update failed: {e}");
                        if matches!(e, DispatchError::Engine(EngineError::Storage(_))) {
                            let _ = transport
                                .send(update.chat_id, OutgoingMessage::text(render::TRY_AGAIN))
                                .await;
                        }
                        "error"
                    }
                };
                metrics::counter!(UPDATES_TOTAL, "command" => label, "status" => status).increment(1);
                metrics::histogram!(UPDATE_DURATION_SECONDS, "command" => label)
                    .record(started.elapsed().as_secs_f64());
            })
            .await?;
        Ok(handle)
    }

    /// Handle one update in place. Callers are expected to hold the
    /// sender's queue slot.
    pub async fn handle(&self, update: &Update, transport: &dyn Transport) -> Result<(), DispatchError> {
        let sender = &update.sender;
        let user = self
            .engine
            .register_user(sender.id, &sender.username, &sender.first_name)
            .await?;

        match &update.kind {
            UpdateKind::Message { text } => self.on_message(&user, update.chat_id, text, transport).await,
            UpdateKind::Callback {
                id,
                data,
                message_id,
            } => {
                self.on_callback(&user, update.chat_id, id, data, *message_id, transport)
                    .await
            }
        }
    }

    async fn on_message(
        &self,
        user: &User,
        chat: ChatId,
        text: &str,
        transport: &dyn Transport,
    ) -> Result<(), DispatchError> {
        let edit_key = menu_edit_key(user.id);
        if let Some(SessionValue::MenuEdit { slot, meal }) = self.sessions.get(&edit_key) {
            self.sessions.delete(&edit_key);
            return self.finish_menu_edit(user, chat, slot, meal, text, transport).await;
        }

        let Some(command) = TextCommand::parse(text) else {
            debug!(user = user.id, "ignoring free text");
            return Ok(());
        };
        if command.is_admin_only() && !self.admins.is_admin(&user.username) {
            return self.deny(user, chat, transport).await;
        }

        let now = self.clock.now();
        match command {
            TextCommand::Start | TextCommand::Help => {
                let help = render::help_text(
                    self.admins.is_admin(&user.username),
                    self.engine.policy().cutoff,
                );
                transport.send(chat, OutgoingMessage::text(help)).await?;
            }
            TextCommand::Select => self.send_selection_form(user, chat, transport).await?,
            TextCommand::Setting => {
                transport.send(chat, render::settings_form(user)).await?;
            }
            TextCommand::SetList => {
                let menu = self.engine.menu().await?;
                transport.send(chat, render::menu_form(&menu)).await?;
            }
            TextCommand::GetCounts => {
                let today = self.engine.policy().local_today(now);
                let count = self.engine.daily_count(today).await?;
                transport
                    .send(chat, OutgoingMessage::text(render::counts_text(&count)))
                    .await?;
            }
            TextCommand::GetReserves => {
                let rosters = self.engine.upcoming_rosters(now).await?;
                transport
                    .send(chat, OutgoingMessage::text(render::rosters_text(&rosters)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn on_callback(
        &self,
        user: &User,
        chat: ChatId,
        callback_id: &str,
        data: &str,
        pressed: MessageId,
        transport: &dyn Transport,
    ) -> Result<(), DispatchError> {
        let action = CallbackAction::parse(data)?;
        let now = self.clock.now();

        match action {
            CallbackAction::Noop | CallbackAction::DayLabel(_) => {
                transport.answer_callback(callback_id, "").await?;
            }
            CallbackAction::Toggle { date, meal } => {
                let (_, outcome) = self
                    .engine
                    .apply_mutation(user, date, Mutation::toggle(meal), now)
                    .await?;
                transport
                    .answer_callback(callback_id, &toggle_answer(date, outcome))
                    .await?;
                self.refresh_selection_form(user, chat, pressed, transport).await?;
            }
            CallbackAction::Bulk(selection) => {
                let report = self.engine.set_all(user, selection, now).await?;
                let answer = if report.applied.is_empty() {
                    render::DAY_CLOSED
                } else {
                    render::ALL_SELECTED
                };
                transport.answer_callback(callback_id, answer).await?;
                self.refresh_selection_form(user, chat, pressed, transport).await?;
            }
            CallbackAction::Standing(meal) => {
                let user = self.engine.toggle_standing(user.id, meal).await?;
                transport
                    .answer_callback(callback_id, render::SETTING_CHANGED)
                    .await?;
                self.delete_quietly(chat, pressed, transport).await;
                transport.send(chat, render::settings_form(&user)).await?;
            }
            CallbackAction::EditMenu { slot, meal } => {
                if !self.admins.is_admin(&user.username) {
                    transport.answer_callback(callback_id, "").await?;
                    return self.deny(user, chat, transport).await;
                }
                self.sessions.set(
                    menu_edit_key(user.id),
                    SessionValue::MenuEdit { slot, meal },
                    self.ttls.menu_edit,
                );
                transport.answer_callback(callback_id, "").await?;
                transport
                    .send(chat, OutgoingMessage::text(render::menu_prompt(slot, meal)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn finish_menu_edit(
        &self,
        user: &User,
        chat: ChatId,
        slot: u8,
        meal: Meal,
        name: &str,
        transport: &dyn Transport,
    ) -> Result<(), DispatchError> {
        if !self.admins.is_admin(&user.username) {
            return self.deny(user, chat, transport).await;
        }
        match self.engine.name_menu_item(slot, meal, name).await {
            Ok(()) => {}
            Err(EngineError::LimitExceeded(reason)) => {
                transport.send(chat, OutgoingMessage::text(reason)).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        transport
            .send(chat, OutgoingMessage::text(render::MENU_UPDATED))
            .await?;
        let menu = self.engine.menu().await?;
        transport.send(chat, render::menu_form(&menu)).await?;
        Ok(())
    }

    /// Send the two-week form and remember its id for the next refresh.
    async fn send_selection_form(
        &self,
        user: &User,
        chat: ChatId,
        transport: &dyn Transport,
    ) -> Result<(), DispatchError> {
        let days = self.engine.selection_window(user, self.clock.now()).await?;
        let menu = self.engine.menu().await?;
        let sent = transport
            .send(chat, render::selection_form(&days, &menu))
            .await?;
        self.sessions.set(
            last_selection_key(user.id),
            SessionValue::LastSelection(sent),
            self.ttls.selection,
        );
        Ok(())
    }

    /// Replace the stale form: the one we remember sending, else the one pressed.
    async fn refresh_selection_form(
        &self,
        user: &User,
        chat: ChatId,
        pressed: MessageId,
        transport: &dyn Transport,
    ) -> Result<(), DispatchError> {
        let previous = match self.sessions.get(&last_selection_key(user.id)) {
            Some(SessionValue::LastSelection(id)) => id,
            _ => pressed,
        };
        self.delete_quietly(chat, previous, transport).await;
        self.send_selection_form(user, chat, transport).await
    }

    /// The message may already be gone; that is not worth failing the update.
    async fn delete_quietly(&self, chat: ChatId, message: MessageId, transport: &dyn Transport) {
        if let Err(e) = transport.delete(chat, message).await {
            debug!(chat, message, "delete failed: {e}");
        }
    }

    async fn deny(&self, user: &User, chat: ChatId, transport: &dyn Transport) -> Result<(), DispatchError> {
        warn!(user = user.id, username = %user.username, "unauthorized admin attempt");
        transport
            .send(chat, OutgoingMessage::text(render::ACCESS_DENIED))
            .await?;
        Ok(())
    }
}

fn toggle_answer(date: NaiveDate, outcome: Outcome) -> String {
    match outcome {
        Outcome::Applied => render::toggled_text(date),
        Outcome::RejectedByCutoff => render::DAY_CLOSED.to_string(),
    }
}

//! The synchronizer task.
//!
//! Binds one channel connection of each kind to the current identity and
//! active conversation, routes inbound events into store actions and performs
//! outbound intents. All state is owned by this one task, so no locks are
//! involved; the only suspension points are channel events, commands and the
//! two typing timers.

use std::sync::Arc;

use kizuna_shared::time::Clock;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::command::Command;
use super::handle::SyncHandle;
use crate::channel::{ChannelConnection, ChannelEvent, ChannelPayload, ChannelSpec, channel_url};
use crate::config::ClientConfig;
use crate::domain::{
    ChannelKind, ChannelStates, Conversation, ConversationPatch, ConnectionState, Identity,
    MessageDraft, MessageId, MessagePatch, MessageStatus, StoreAction, Transport, TypingTracker,
    UserProfile, canonical_id, synthesize_conversation,
};
use crate::error::{ChannelError, SyncError};
use crate::infrastructure::dto::websocket::{
    ConversationInbound, InboundEvent, NotificationInbound, OutboundEvent, StatusInbound,
    TypingDto,
};
use crate::store::ChatStore;

/// An outbound action requested by the UI
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundIntent {
    ChatMessage(MessageDraft),
    Typing,
    StopTyping,
    MarkRead(MessageId),
    Join(String),
    Leave(String),
}

#[derive(Default)]
struct Channels {
    conversation: Option<ChannelConnection>,
    delivery_status: Option<ChannelConnection>,
    notification: Option<ChannelConnection>,
}

impl Channels {
    fn get(&self, kind: ChannelKind) -> Option<&ChannelConnection> {
        match kind {
            ChannelKind::Conversation => self.conversation.as_ref(),
            ChannelKind::DeliveryStatus => self.delivery_status.as_ref(),
            ChannelKind::Notification => self.notification.as_ref(),
        }
    }

    fn slot(&mut self, kind: ChannelKind) -> &mut Option<ChannelConnection> {
        match kind {
            ChannelKind::Conversation => &mut self.conversation,
            ChannelKind::DeliveryStatus => &mut self.delivery_status,
            ChannelKind::Notification => &mut self.notification,
        }
    }
}

pub struct Synchronizer {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    store: ChatStore,
    identity_rx: watch::Receiver<Option<Identity>>,
    identity: Option<Identity>,
    /// User whose data the store holds; survives sign-out
    bound_user: Option<String>,
    active_chat_id: Option<String>,
    channels: Channels,
    states: watch::Sender<ChannelStates>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    next_epoch: u64,
    typing: TypingTracker,
    /// When the debounced `stop_typing` for local keystrokes is due
    typing_stop_at: Option<Instant>,
}

impl Synchronizer {
    /// Start the synchronizer task and return its handle.
    ///
    /// `identity` is the session's identity receiver; the task follows every
    /// change (sign-in, token refresh, sign-out).
    pub fn spawn(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        identity: watch::Receiver<Option<Identity>>,
    ) -> SyncHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (states, states_rx) = watch::channel(ChannelStates::default());
        let store = ChatStore::default();
        let state_rx = store.subscribe();

        let synchronizer = Self {
            typing: TypingTracker::new(config.typing_expiry),
            config,
            transport,
            clock,
            store,
            identity_rx: identity,
            identity: None,
            bound_user: None,
            active_chat_id: None,
            channels: Channels::default(),
            states,
            events_tx,
            events_rx,
            next_epoch: 0,
            typing_stop_at: None,
        };
        tokio::spawn(synchronizer.run(command_rx));

        SyncHandle::new(command_tx, state_rx, states_rx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let initial = self.identity_rx.borrow_and_update().clone();
        self.on_identity(initial).await;
        let mut identity_open = true;

        loop {
            let typing_stop_at = self.typing_stop_at;
            let typing_expiry = self.typing.next_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.teardown_all().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.teardown_all().await;
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                changed = self.identity_rx.changed(), if identity_open => match changed {
                    Ok(()) => {
                        let identity = self.identity_rx.borrow_and_update().clone();
                        self.on_identity(identity).await;
                    }
                    Err(_) => identity_open = false,
                },
                () = sleep_until_opt(typing_stop_at) => self.fire_stop_typing(),
                () = sleep_until_opt(typing_expiry) => self.expire_typists(),
            }
        }
        info!("Synchronizer stopped");
    }

    // ========================================
    // Lifecycle
    // ========================================

    async fn on_identity(&mut self, identity: Option<Identity>) {
        let Some(identity) = identity else {
            info!("Identity cleared; closing all channels");
            self.identity = None;
            self.teardown_all().await;
            self.clear_active_chat();
            return;
        };

        let same_user = self
            .identity
            .as_ref()
            .is_some_and(|current| current.user.id == identity.user.id);
        if same_user {
            debug!("Access token updated");
            self.identity = Some(identity);
            self.retarget_channels();
            return;
        }

        info!("Binding channels to user {}", identity.user.id);
        self.teardown_all().await;
        if self
            .bound_user
            .as_ref()
            .is_some_and(|user| *user != identity.user.id)
        {
            info!("Different user signed in; clearing local state");
            self.store.reset();
            self.active_chat_id = None;
            self.typing = TypingTracker::new(self.config.typing_expiry);
        }
        self.bound_user = Some(identity.user.id.clone());
        self.identity = Some(identity);
        self.open_channel(ChannelKind::Notification);
        if self.active_chat_id.is_some() {
            self.open_channel(ChannelKind::Conversation);
            self.open_channel(ChannelKind::DeliveryStatus);
        }
    }

    /// Forget the active chat and its typists after sign-out
    fn clear_active_chat(&mut self) {
        self.typing = TypingTracker::new(self.config.typing_expiry);
        if let Some(chat_id) = self.active_chat_id.take() {
            self.store.dispatch(StoreAction::SetTypingUsers {
                chat_id,
                names: Vec::new(),
            });
            self.store.dispatch(StoreAction::SetActiveChat(None));
        }
    }

    async fn set_active_chat(&mut self, chat_id: Option<String>) {
        if chat_id == self.active_chat_id {
            self.store.dispatch(StoreAction::SetActiveChat(chat_id));
            return;
        }

        if self.typing_stop_at.take().is_some() {
            self.send_stop_typing_best_effort();
        }
        if let Some(previous) = &self.active_chat_id {
            self.typing.clear(previous);
        }
        self.teardown(ChannelKind::Conversation).await;
        self.teardown(ChannelKind::DeliveryStatus).await;

        info!("Active conversation: {:?}", chat_id);
        self.active_chat_id = chat_id.clone();
        self.store.dispatch(StoreAction::SetActiveChat(chat_id));

        if self.active_chat_id.is_some() && self.identity.is_some() {
            self.open_channel(ChannelKind::Conversation);
            self.open_channel(ChannelKind::DeliveryStatus);
        }
    }

    /// Create and connect a channel of `kind` for the current binding
    fn open_channel(&mut self, kind: ChannelKind) {
        match self.build_channel(kind) {
            Ok(mut connection) => {
                connection.connect();
                *self.channels.slot(kind) = Some(connection);
            }
            Err(e) => warn!("Cannot open {} channel: {}", kind, e),
        }
    }

    /// URL and greeting of `kind` for the current identity and active chat
    fn channel_target(
        &self,
        kind: ChannelKind,
    ) -> Result<(String, Vec<OutboundEvent>), ChannelError> {
        let identity = self
            .identity
            .as_ref()
            .ok_or(ChannelError::MissingCredential(kind))?;
        let url = channel_url(
            &self.config.ws_base_url,
            &self.config.endpoints,
            kind,
            self.active_chat_id.as_deref(),
            &identity.access_token,
        )?;

        let greeting = match (kind, &self.active_chat_id) {
            (ChannelKind::Conversation, Some(chat_id)) => vec![
                OutboundEvent::authenticate(identity),
                OutboundEvent::join_chat(chat_id, &identity.user),
            ],
            _ => Vec::new(),
        };
        Ok((url, greeting))
    }

    fn build_channel(&mut self, kind: ChannelKind) -> Result<ChannelConnection, ChannelError> {
        let (url, greeting) = self.channel_target(kind)?;
        self.next_epoch += 1;
        let spec = ChannelSpec {
            kind,
            url,
            greeting,
            epoch: self.next_epoch,
        };
        Ok(ChannelConnection::new(
            spec,
            Arc::clone(&self.transport),
            self.config.reconnect,
            self.events_tx.clone(),
        ))
    }

    /// Point every live channel at the current credential
    fn retarget_channels(&mut self) {
        for kind in ChannelKind::ALL {
            if self.channels.get(kind).is_none() {
                continue;
            }
            match self.channel_target(kind) {
                Ok((url, greeting)) => {
                    if let Some(connection) = self.channels.slot(kind) {
                        connection.retarget(url, greeting);
                    }
                }
                Err(e) => warn!("Cannot retarget {} channel: {}", kind, e),
            }
        }
    }

    /// Fully stop a channel, including any pending reconnect timer
    async fn teardown(&mut self, kind: ChannelKind) {
        if let Some(mut connection) = self.channels.slot(kind).take() {
            connection.disconnect().await;
        }
        self.states
            .send_modify(|states| states.set(kind, ConnectionState::Disconnected));
    }

    async fn teardown_all(&mut self) {
        self.typing_stop_at = None;
        for kind in ChannelKind::ALL {
            self.teardown(kind).await;
        }
    }

    fn reconnect_all(&mut self) {
        info!("Manual reconnect of all channels");
        for kind in ChannelKind::ALL {
            if let Some(connection) = self.channels.slot(kind) {
                connection.reconnect();
                continue;
            }
            let wanted = match kind {
                ChannelKind::Notification => self.identity.is_some(),
                _ => self.identity.is_some() && self.active_chat_id.is_some(),
            };
            if wanted {
                self.open_channel(kind);
            }
        }
    }

    // ========================================
    // Commands
    // ========================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Outbound { intent, reply } => {
                let _ = reply.send(self.perform(intent));
            }
            Command::SetActiveChat { chat_id, reply } => {
                self.set_active_chat(chat_id).await;
                let _ = reply.send(());
            }
            Command::OpenDirectChat { contact, reply } => {
                let result = self.open_direct_chat(contact).await;
                let _ = reply.send(result);
            }
            Command::AddConversation {
                conversation,
                reply,
            } => {
                self.store
                    .dispatch(StoreAction::AddConversation(conversation));
                let _ = reply.send(());
            }
            Command::LoadConversations {
                conversations,
                reply,
            } => {
                self.store.dispatch_all(
                    conversations
                        .into_iter()
                        .map(StoreAction::ReconcileConversation),
                );
                let _ = reply.send(());
            }
            Command::ReconnectAll { reply } => {
                self.reconnect_all();
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                // handled by the run loop
                let _ = reply.send(());
            }
        }
    }

    async fn open_direct_chat(&mut self, contact: UserProfile) -> Result<String, SyncError> {
        let me = self
            .identity
            .as_ref()
            .map(|identity| identity.user.clone())
            .ok_or(SyncError::NoIdentity)?;
        let chat_id = canonical_id(&me.mobile, &contact.mobile);

        if self.store.read(|state| state.conversation(&chat_id).is_none()) {
            let conversation = Conversation::direct(&chat_id, &me, &contact, self.clock.now());
            self.store
                .dispatch(StoreAction::AddConversation(conversation));
        }
        self.set_active_chat(Some(chat_id.clone())).await;
        Ok(chat_id)
    }

    fn perform(&mut self, intent: OutboundIntent) -> Result<(), SyncError> {
        let user = self
            .identity
            .as_ref()
            .map(|identity| identity.user.clone())
            .ok_or(SyncError::NoIdentity)?;

        match intent {
            OutboundIntent::ChatMessage(draft) => {
                let chat_id = self.require_active_chat()?;
                let event = OutboundEvent::send_message(&chat_id, &user, &draft);
                self.send(ChannelKind::Conversation, &event)
            }
            OutboundIntent::Typing => {
                let chat_id = self.require_active_chat()?;
                let event = OutboundEvent::typing(&chat_id, &user);
                if self.send(ChannelKind::Conversation, &event).is_ok() {
                    self.typing_stop_at = Some(Instant::now() + self.config.typing_stop_after);
                }
                Ok(())
            }
            OutboundIntent::StopTyping => {
                self.require_active_chat()?;
                self.typing_stop_at = None;
                self.send_stop_typing_best_effort();
                Ok(())
            }
            OutboundIntent::MarkRead(message_id) => {
                let chat_id = self.require_active_chat()?;
                let event = OutboundEvent::mark_read(&chat_id, &message_id, &user);
                self.send(ChannelKind::DeliveryStatus, &event)
            }
            OutboundIntent::Join(chat_id) => {
                let event = OutboundEvent::join_chat(&chat_id, &user);
                self.send(ChannelKind::Conversation, &event)
            }
            OutboundIntent::Leave(chat_id) => {
                let event = OutboundEvent::leave_chat(&chat_id, &user);
                self.send(ChannelKind::Conversation, &event)
            }
        }
    }

    fn require_active_chat(&self) -> Result<String, SyncError> {
        self.active_chat_id
            .clone()
            .ok_or(SyncError::NoActiveConversation)
    }

    fn send(&self, kind: ChannelKind, event: &OutboundEvent) -> Result<(), SyncError> {
        let connection = self
            .channels
            .get(kind)
            .ok_or(SyncError::NotConnected(kind))?;
        connection.send(event).map_err(|e| {
            debug!("'{}' rejected: {}", event.event_type(), e);
            SyncError::NotConnected(kind)
        })
    }

    fn send_stop_typing_best_effort(&self) {
        let (Some(identity), Some(chat_id)) = (&self.identity, &self.active_chat_id) else {
            return;
        };
        let event = OutboundEvent::stop_typing(chat_id, &identity.user);
        if let Err(e) = self.send(ChannelKind::Conversation, &event) {
            debug!("stop_typing not sent: {}", e);
        }
    }

    fn fire_stop_typing(&mut self) {
        self.typing_stop_at = None;
        self.send_stop_typing_best_effort();
    }

    fn expire_typists(&mut self) {
        let changed = self.typing.expire(Instant::now());
        if changed.is_empty() {
            return;
        }
        self.store.dispatch_all(
            changed
                .into_iter()
                .map(|(chat_id, names)| StoreAction::SetTypingUsers { chat_id, names }),
        );
    }

    // ========================================
    // Inbound routing
    // ========================================

    fn is_current(&self, kind: ChannelKind, epoch: u64) -> bool {
        self.channels
            .get(kind)
            .is_some_and(|connection| connection.epoch() == epoch)
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        if !self.is_current(event.kind, event.epoch) {
            debug!(
                "Dropping stale {} event from epoch {}",
                event.kind, event.epoch
            );
            return;
        }

        match event.payload {
            ChannelPayload::State(state) => {
                self.states
                    .send_modify(|states| states.set(event.kind, state));
            }
            ChannelPayload::Inbound(InboundEvent::Conversation(inbound)) => {
                self.on_conversation_event(inbound)
            }
            ChannelPayload::Inbound(InboundEvent::Status(inbound)) => self.on_status_event(inbound),
            ChannelPayload::Inbound(InboundEvent::Notification(inbound)) => {
                self.on_notification_event(inbound)
            }
        }
    }

    fn self_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.user.id.as_str())
    }

    /// Resolve the chat an event belongs to, falling back to the active one
    fn resolve_chat(&self, explicit: [Option<&str>; 2]) -> Option<String> {
        explicit
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| self.active_chat_id.clone())
    }

    fn on_conversation_event(&mut self, inbound: ConversationInbound) {
        match inbound {
            ConversationInbound::OldMessages {
                messages,
                chat_id,
                room_id,
            } => {
                let Some(chat_id) = self.resolve_chat([chat_id.as_deref(), room_id.as_deref()])
                else {
                    warn!("old_messages without a conversation; ignored");
                    return;
                };
                let messages = messages
                    .into_iter()
                    .map(|dto| dto.into_message(&chat_id, self.clock.as_ref()))
                    .collect();
                self.store
                    .dispatch(StoreAction::SetMessages { chat_id, messages });
            }
            ConversationInbound::NewMessage {
                message,
                chat_id,
                room_id,
            } => {
                let explicit = chat_id
                    .as_deref()
                    .or(room_id.as_deref())
                    .or(message.chat_id())
                    .map(str::to_string);
                let Some(chat_id) = self.resolve_chat([explicit.as_deref(), None]) else {
                    warn!("new_message without a conversation; ignored");
                    return;
                };
                let message = message.into_message(&chat_id, self.clock.as_ref());
                let from_self = self.self_id() == Some(message.sender_id.as_str());
                let is_active = self.active_chat_id.as_deref() == Some(chat_id.as_str());

                let mut actions = vec![StoreAction::AddMessage {
                    chat_id: chat_id.clone(),
                    message,
                }];
                if !from_self && !is_active {
                    actions.push(StoreAction::IncrementUnread(chat_id));
                }
                self.store.dispatch_all(actions);
            }
            ConversationInbound::Typing(typing) => self.on_typing(typing, false),
            ConversationInbound::StopTyping(typing) => self.on_typing(typing, true),
            ConversationInbound::MessageRead {
                message_id,
                read_by,
                chat_id,
                room_id,
            } => {
                let Some(chat_id) = self.resolve_chat([chat_id.as_deref(), room_id.as_deref()])
                else {
                    return;
                };
                let read_by = read_by.into_iter().map(|id| id.into_string()).collect();
                self.store.dispatch(StoreAction::UpdateMessage {
                    chat_id,
                    patch: MessagePatch::read_by(message_id.into(), read_by),
                });
            }
            ConversationInbound::ReceiverInfo { receiver } => {
                let (Some(receiver), Some(chat_id)) = (receiver, self.active_chat_id.clone())
                else {
                    return;
                };
                self.store.dispatch(StoreAction::ReconcileParticipant {
                    chat_id,
                    participant: receiver.into(),
                });
            }
            ConversationInbound::AuthenticateResponse { success, message } => {
                if success == Some(false) {
                    warn!("Authentication rejected: {}", message.unwrap_or_default());
                } else {
                    info!("Authenticated on the conversation channel");
                }
            }
            ConversationInbound::Unknown => {
                warn!("Ignoring unknown event on the conversation channel");
            }
        }
    }

    fn on_typing(&mut self, typing: TypingDto, stopped: bool) {
        if typing.user_id().as_deref() == self.self_id() && self.self_id().is_some() {
            return;
        }
        let Some(chat_id) = self.resolve_chat([typing.chat_id(), None]) else {
            return;
        };

        let now = Instant::now();
        let names = match (&typing.typing_users, stopped) {
            (Some(list), _) => self.typing.observe(&chat_id, list, now),
            (None, false) => self.typing.observe(&chat_id, &typing.names(), now),
            (None, true) => match &typing.user_name {
                Some(name) => self.typing.remove(&chat_id, name),
                None => self.typing.typists(&chat_id),
            },
        };
        self.store
            .dispatch(StoreAction::SetTypingUsers { chat_id, names });
    }

    fn on_status_event(&mut self, inbound: StatusInbound) {
        match inbound {
            StatusInbound::MessageStatusUpdate {
                message_id,
                status,
                chat_id,
                room_id,
            } => {
                let Some(status) = MessageStatus::from_wire(&status) else {
                    warn!("Unknown message status '{}'; ignored", status);
                    return;
                };
                let message_id = MessageId::from(message_id);
                let explicit = chat_id.or(room_id).filter(|id| !id.is_empty()).or_else(|| {
                    self.store
                        .read(|state| state.chat_of_message(&message_id).map(str::to_string))
                });
                let Some(chat_id) = self.resolve_chat([explicit.as_deref(), None]) else {
                    return;
                };
                self.store.dispatch(StoreAction::UpdateMessage {
                    chat_id,
                    patch: MessagePatch::status(message_id, status),
                });
            }
            StatusInbound::UserOnline { online_users } | StatusInbound::UserOffline { online_users } => {
                self.store.dispatch(StoreAction::SetOnlineUsers(online_users));
            }
            StatusInbound::Unknown => {
                warn!("Ignoring unknown event on the delivery-status channel");
            }
        }
    }

    fn on_notification_event(&mut self, inbound: NotificationInbound) {
        match inbound {
            NotificationInbound::Notification { last_message } => {
                let preview = last_message.into_preview(self.clock.as_ref());
                if preview.chat_id.is_empty() {
                    warn!("Notification without a conversation id; ignored");
                    return;
                }
                let self_mobile = self
                    .identity
                    .as_ref()
                    .map(|identity| identity.user.mobile.clone())
                    .unwrap_or_default();
                let chat_id = preview.chat_id.clone();

                let mut actions = Vec::with_capacity(3);
                if self.store.read(|state| state.conversation(&chat_id).is_none()) {
                    debug!("Synthesizing conversation {} from notification", chat_id);
                    actions.push(StoreAction::AddConversation(synthesize_conversation(
                        &preview,
                        &self_mobile,
                    )));
                }
                actions.push(StoreAction::UpdateConversation(
                    ConversationPatch::last_message(&chat_id, preview.to_message()),
                ));
                actions.push(StoreAction::IncrementUnread(chat_id));
                self.store.dispatch_all(actions);
            }
            NotificationInbound::Unknown => {
                warn!("Ignoring unknown event on the notification channel");
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kizuna_shared::time::FixedClock;
    use serde_json::Value;
    use tokio::time::timeout;

    use super::*;
    use crate::channel::testing::{ScriptedTransport, ServerEnd};
    use crate::domain::{ChatState, MessageType};

    const CHAT: &str = "chat_111_with_222";

    fn profile(id: &str, name: &str, mobile: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            mobile: mobile.to_string(),
            profile_pic: None,
            is_online: true,
        }
    }

    fn alice() -> Identity {
        Identity {
            user: profile("1", "Alice", "111"),
            access_token: "token-a".to_string(),
        }
    }

    fn bob() -> UserProfile {
        profile("2", "Bob", "222")
    }

    struct Fixture {
        handle: SyncHandle,
        transport: ScriptedTransport,
        accepted: mpsc::UnboundedReceiver<ServerEnd>,
        pending: Vec<ServerEnd>,
        identity_tx: watch::Sender<Option<Identity>>,
    }

    impl Fixture {
        fn start(
            identity: Option<Identity>,
            transport: ScriptedTransport,
            accepted: mpsc::UnboundedReceiver<ServerEnd>,
        ) -> Self {
            let (identity_tx, identity_rx) = watch::channel(identity);
            let config = ClientConfig {
                ws_base_url: "ws://chat.test".to_string(),
                ..ClientConfig::default()
            };
            let handle = Synchronizer::spawn(
                config,
                Arc::new(transport.clone()),
                Arc::new(FixedClock::from_millis(1_700_000_000_000)),
                identity_rx,
            );
            Self {
                handle,
                transport,
                accepted,
                pending: Vec::new(),
                identity_tx,
            }
        }

        fn signed_in() -> Self {
            let (transport, accepted) = ScriptedTransport::accepting();
            Self::start(Some(alice()), transport, accepted)
        }

        /// The next accepted socket whose url contains `path`
        async fn server(&mut self, path: &str) -> ServerEnd {
            if let Some(index) = self.pending.iter().position(|s| s.url.contains(path)) {
                return self.pending.remove(index);
            }
            loop {
                let server = timeout(Duration::from_secs(5), self.accepted.recv())
                    .await
                    .expect("no socket opened")
                    .expect("transport dropped");
                if server.url.contains(path) {
                    return server;
                }
                self.pending.push(server);
            }
        }

        async fn wait_connected(&self, kind: ChannelKind) {
            let mut states = self.handle.connection_states();
            timeout(
                Duration::from_secs(5),
                states.wait_for(|states| states.get(kind) == ConnectionState::Connected),
            )
            .await
            .expect("channel never connected")
            .expect("synchronizer stopped");
        }

        async fn wait_state(&self, predicate: impl FnMut(&ChatState) -> bool) -> ChatState {
            let mut state = self.handle.state();
            let result = timeout(Duration::from_secs(5), state.wait_for(predicate))
                .await
                .expect("state never matched")
                .expect("synchronizer stopped")
                .clone();
            result
        }

        /// Activate `chat_id` and return its connected conversation and status sockets
        /// with the greeting already consumed.
        async fn activate(&mut self, chat_id: &str) -> (ServerEnd, ServerEnd) {
            self.handle
                .set_active_chat(Some(chat_id.to_string()))
                .await
                .unwrap();
            let mut conversation = self.server("/ws/chat/").await;
            let status = self.server("/ws/status/").await;
            self.wait_connected(ChannelKind::Conversation).await;
            self.wait_connected(ChannelKind::DeliveryStatus).await;
            next_type(&mut conversation).await;
            next_type(&mut conversation).await;
            (conversation, status)
        }
    }

    async fn next_json(server: &mut ServerEnd) -> Value {
        let text = timeout(Duration::from_secs(5), server.next_sent())
            .await
            .expect("nothing sent")
            .expect("socket dropped");
        serde_json::from_str(&text).unwrap()
    }

    async fn next_type(server: &mut ServerEnd) -> String {
        next_json(server).await["type"].as_str().unwrap().to_string()
    }

    async fn next_raw(server: &mut ServerEnd) -> String {
        timeout(Duration::from_secs(5), server.next_sent())
            .await
            .expect("nothing sent")
            .expect("socket dropped")
    }

    fn new_message(id: i64, chat_id: &str, sender_id: i64, content: &str) -> String {
        format!(
            r#"{{"type":"new_message","chat_id":"{chat_id}","message":{{"id":{id},"sender_id":{sender_id},"content":"{content}","timestamp":"2025-01-01T10:00:00Z"}}}}"#
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_activating_chat_opens_channels_and_greets() {
        // テスト項目: 会話を選択すると会話・配信状態チャネルが開き、認証と参加が順に送られる
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let notification = fixture.server("/ws/notifications/").await;

        // when (操作):
        fixture
            .handle
            .set_active_chat(Some(CHAT.to_string()))
            .await
            .unwrap();
        let mut conversation = fixture.server("/ws/chat/").await;
        let status = fixture.server("/ws/status/").await;

        // then (期待する結果):
        assert_eq!(
            notification.url,
            "ws://chat.test/ws/notifications/?token=token-a"
        );
        assert_eq!(
            conversation.url,
            "ws://chat.test/ws/chat/chat_111_with_222/?token=token-a"
        );
        assert_eq!(status.url, "ws://chat.test/ws/status/?token=token-a");

        let authenticate = next_json(&mut conversation).await;
        assert_eq!(authenticate["type"], "authenticate");
        assert_eq!(authenticate["token"], "token-a");
        assert_eq!(authenticate["user_id"], 1);
        let join = next_json(&mut conversation).await;
        assert_eq!(join["type"], "join_chat");
        assert_eq!(join["chat_id"], CHAT);
        assert_eq!(join["room_id"], CHAT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_synthesize_conversation_and_count_unread() {
        // テスト項目: 未知の会話への通知で会話が 1 件だけ合成され、未読が 1 → 2 と増える
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let notification = fixture.server("/ws/notifications/").await;
        fixture.wait_connected(ChannelKind::Notification).await;
        let frame = |text: &str| {
            format!(
                r#"{{"type":"notification","last_message":{{"chat_id":"{CHAT}","sender":{{"id":2,"name":"Bob","mobile":"222"}},"text":"{text}","timestamp":"2025-01-01T10:00:00Z"}}}}"#
            )
        };

        // when (操作):
        notification.push_text(frame("hello"));
        let first = fixture.wait_state(|state| state.unread(CHAT) == 1).await;
        notification.push_text(frame("again"));
        let second = fixture.wait_state(|state| state.unread(CHAT) == 2).await;

        // then (期待する結果):
        assert_eq!(first.conversations.len(), 1);
        assert_eq!(second.conversations.len(), 1);
        let conversation = second.conversation(CHAT).unwrap();
        assert_eq!(conversation.name, "Bob");
        assert!(!conversation.is_group);
        assert_eq!(conversation.participants[0].id, None);
        assert_eq!(conversation.participants[0].mobile, "222");
        assert_eq!(
            conversation.last_message.as_ref().unwrap().content,
            "again"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_message_unread_rules() {
        // テスト項目: 他人から非アクティブ会話へのメッセージだけが未読を増やす
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let (conversation, _status) = fixture.activate(CHAT).await;

        // when (操作):
        conversation.push_text(new_message(1, CHAT, 2, "in active chat"));
        conversation.push_text(new_message(4, CHAT, 1, "mine in active chat"));
        conversation.push_text(new_message(2, "room-9", 1, "from myself"));
        conversation.push_text(new_message(3, "room-9", 2, "elsewhere"));
        let state = fixture
            .wait_state(|state| state.messages("room-9").len() == 2)
            .await;

        // then (期待する結果):
        assert_eq!(state.messages(CHAT).len(), 2);
        assert_eq!(state.unread(CHAT), 0);
        assert_eq!(state.unread("room-9"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_update_marks_last_message_read() {
        // テスト項目: 既読の配信状態更新が最新メッセージにも反映される
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        fixture
            .handle
            .add_conversation(Conversation::direct(
                CHAT,
                &alice().user,
                &bob(),
                FixedClock::from_millis(0).now(),
            ))
            .await
            .unwrap();
        let (conversation, status) = fixture.activate(CHAT).await;
        conversation.push_text(new_message(42, CHAT, 1, "hi"));
        fixture
            .wait_state(|state| state.messages(CHAT).len() == 1)
            .await;

        // when (操作):
        status.push_text(r#"{"type":"message_status_update","message_id":42,"status":"read"}"#);
        let state = fixture
            .wait_state(|state| state.messages(CHAT)[0].status == MessageStatus::Read)
            .await;

        // then (期待する結果):
        let last = state
            .conversation(CHAT)
            .and_then(|conversation| conversation.last_message.clone())
            .unwrap();
        assert_eq!(last.id, MessageId::Number(42));
        assert_eq!(last.status, MessageStatus::Read);
        assert!(last.is_read);
        assert!(state.messages(CHAT)[0].is_read);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_chat_closes_previous_channels() {
        // テスト項目: 会話を切り替えると旧チャネルは正常クローズされ、新しい会話に接続し直す
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let (mut old_conversation, mut old_status) = fixture.activate(CHAT).await;

        // when (操作):
        let (new_conversation, _new_status) = fixture.activate("chat_111_with_333").await;

        // then (期待する結果):
        assert_eq!(next_raw(&mut old_conversation).await, "close:1000");
        assert_eq!(next_raw(&mut old_status).await, "close:1000");
        assert!(new_conversation.url.contains("/ws/chat/chat_111_with_333/"));
        assert_eq!(
            fixture.handle.state().borrow().active_chat_id.as_deref(),
            Some("chat_111_with_333")
        );
        // 通知 1 + 会話 2 + 配信状態 2
        assert_eq!(fixture.transport.open_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_requires_identity() {
        // テスト項目: 未ログインでは送信が NoIdentity で拒否される
        // given (前提条件):
        let (transport, accepted) = ScriptedTransport::accepting();
        let fixture = Fixture::start(None, transport, accepted);

        // when (操作):
        let result = fixture.handle.send_text("hello").await;

        // then (期待する結果):
        assert_eq!(result, Err(SyncError::NoIdentity));
        assert_eq!(fixture.transport.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_requires_active_conversation() {
        // テスト項目: アクティブな会話がなければ NoActiveConversation で拒否される
        // given (前提条件):
        let fixture = Fixture::signed_in();

        // when (操作):
        let message = fixture.handle.send_text("hello").await;
        let read = fixture.handle.mark_read(MessageId::from(1_i64)).await;

        // then (期待する結果):
        assert_eq!(message, Err(SyncError::NoActiveConversation));
        assert_eq!(read, Err(SyncError::NoActiveConversation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_rejected_while_channel_not_connected() {
        // テスト項目: 会話チャネルが未接続の間の送信は NotConnected で拒否されるが、入力中通知は黙って捨てられる
        // given (前提条件):
        let (transport, accepted) = ScriptedTransport::refusing();
        let fixture = Fixture::start(Some(alice()), transport, accepted);
        fixture
            .handle
            .set_active_chat(Some(CHAT.to_string()))
            .await
            .unwrap();

        // when (操作):
        let message = fixture.handle.send_text("hello").await;
        let typing = fixture.handle.send_typing().await;

        // then (期待する結果):
        assert_eq!(
            message,
            Err(SyncError::NotConnected(ChannelKind::Conversation))
        );
        assert_eq!(typing, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_and_mark_read_use_their_channels() {
        // テスト項目: メッセージは会話チャネル、既読は配信状態チャネルで送られる
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let (mut conversation, mut status) = fixture.activate(CHAT).await;

        // when (操作):
        fixture.handle.send_text("hello").await.unwrap();
        fixture
            .handle
            .mark_read(MessageId::from(42_i64))
            .await
            .unwrap();

        // then (期待する結果):
        let message = next_json(&mut conversation).await;
        assert_eq!(message["type"], "send_message");
        assert_eq!(message["content"], "hello");
        assert_eq!(message["message_type"], MessageType::Text.as_str());
        assert_eq!(message["sender"]["name"], "Alice");
        let read = next_json(&mut status).await;
        assert_eq!(read["type"], "mark_read");
        assert_eq!(read["message_id"], 42);
        assert_eq!(read["chat_id"], CHAT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_typing_sent_after_quiet_period() {
        // テスト項目: 最後の入力から 1000ms 後に stop_typing が 1 回だけ送られる
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let (mut conversation, _status) = fixture.activate(CHAT).await;

        // when (操作):
        fixture.handle.send_typing().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        fixture.handle.send_typing().await.unwrap();
        let last_keystroke = Instant::now();

        // then (期待する結果):
        assert_eq!(next_type(&mut conversation).await, "typing");
        assert_eq!(next_type(&mut conversation).await, "typing");
        assert_eq!(next_type(&mut conversation).await, "stop_typing");
        let quiet = last_keystroke.elapsed();
        assert!(quiet >= Duration::from_millis(1000));
        assert!(quiet < Duration::from_millis(1100));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(conversation.try_next_sent().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_typists_expire_and_self_is_ignored() {
        // テスト項目: 相手の入力中表示は更新がなければ消え、自分の入力中イベントは無視される
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let (conversation, _status) = fixture.activate(CHAT).await;

        // when (操作):
        conversation.push_text(format!(
            r#"{{"type":"typing","chat_id":"{CHAT}","user_id":1,"user_name":"Alice"}}"#
        ));
        conversation.push_text(format!(
            r#"{{"type":"typing","chat_id":"{CHAT}","user_id":2,"user_name":"Bob"}}"#
        ));
        let typing = fixture
            .wait_state(|state| !state.typing(CHAT).is_empty())
            .await;
        let shown_at = Instant::now();
        fixture.wait_state(|state| state.typing(CHAT).is_empty()).await;

        // then (期待する結果):
        assert_eq!(typing.typing(CHAT), ["Bob".to_string()]);
        assert!(shown_at.elapsed() <= Duration::from_millis(1000));
        assert!(!fixture
            .handle
            .state()
            .borrow()
            .typing_users
            .contains_key(CHAT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_direct_chat_creates_and_activates_conversation() {
        // テスト項目: 連絡先を開くと正規 ID の会話が作られアクティブになる
        // given (前提条件):
        let mut fixture = Fixture::signed_in();

        // when (操作):
        let chat_id = fixture.handle.open_direct_chat(bob()).await.unwrap();
        let again = fixture.handle.open_direct_chat(bob()).await.unwrap();
        let conversation = fixture.server("/ws/chat/").await;

        // then (期待する結果):
        assert_eq!(chat_id, CHAT);
        assert_eq!(again, CHAT);
        let state = fixture.handle.state().borrow().clone();
        assert_eq!(state.active_chat_id.as_deref(), Some(CHAT));
        assert_eq!(state.conversations.len(), 1);
        assert_eq!(state.conversations[0].name, "Bob");
        assert_eq!(state.conversations[0].participants.len(), 2);
        assert!(conversation.url.contains(CHAT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receiver_info_resolves_synthesized_participant() {
        // テスト項目: receiver_info で合成された参加者の ID が補完される
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let notification = fixture.server("/ws/notifications/").await;
        fixture.wait_connected(ChannelKind::Notification).await;
        notification.push_text(format!(
            r#"{{"type":"notification","last_message":{{"chat_id":"{CHAT}","sender":{{"name":"Bob","mobile":"222"}},"text":"hi"}}}}"#
        ));
        fixture.wait_state(|state| state.unread(CHAT) == 1).await;
        let (conversation, _status) = fixture.activate(CHAT).await;

        // when (操作):
        conversation.push_text(
            r#"{"type":"receiver_info","receiver":{"id":2,"name":"Bob","mobile":"222","is_online":true}}"#,
        );
        let state = fixture
            .wait_state(|state| {
                state
                    .conversation(CHAT)
                    .is_some_and(|c| c.participants.iter().any(|p| p.id.is_some()))
            })
            .await;

        // then (期待する結果):
        let participants = &state.conversation(CHAT).unwrap().participants;
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].id.as_deref(), Some("2"));
        assert_eq!(state.unread(CHAT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_closes_every_channel() {
        // テスト項目: ログアウトで全チャネルが正常クローズされ、状態が disconnected になる
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let mut notification = fixture.server("/ws/notifications/").await;
        let (mut conversation, mut status) = fixture.activate(CHAT).await;
        fixture.wait_connected(ChannelKind::Notification).await;

        // when (操作):
        fixture.identity_tx.send_replace(None);

        // then (期待する結果):
        assert_eq!(next_raw(&mut conversation).await, "close:1000");
        assert_eq!(next_raw(&mut status).await, "close:1000");
        assert_eq!(next_raw(&mut notification).await, "close:1000");
        let mut states = fixture.handle.connection_states();
        let states = timeout(
            Duration::from_secs(5),
            states.wait_for(|states| *states == ChannelStates::default()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(states.conversation, ConnectionState::Disconnected);
        assert_eq!(
            fixture.handle.send_text("bye").await,
            Err(SyncError::NoIdentity)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_refresh_is_used_by_reconnects() {
        // テスト項目: トークン更新後は開いている接続を維持し、再接続時に新しいトークンで認証する
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let (conversation, mut status) = fixture.activate(CHAT).await;
        let refreshed = Identity {
            access_token: "token-new".to_string(),
            ..alice()
        };

        // when (操作):
        fixture.identity_tx.send_replace(Some(refreshed));
        tokio::time::sleep(Duration::from_millis(10)).await;
        conversation.close(Some(1006));
        let mut reopened = fixture.server("/ws/chat/").await;

        // then (期待する結果):
        assert_eq!(
            reopened.url,
            "ws://chat.test/ws/chat/chat_111_with_222/?token=token-new"
        );
        let authenticate = next_json(&mut reopened).await;
        assert_eq!(authenticate["type"], "authenticate");
        assert_eq!(authenticate["token"], "token-new");
        assert_eq!(next_type(&mut reopened).await, "join_chat");
        assert_eq!(status.try_next_sent(), None);
        assert_eq!(fixture.transport.open_count(), 4);

        // when (操作): 手動再接続でも新しいトークンが使われる
        fixture.handle.reconnect_all().await.unwrap();
        status.close(Some(1006));
        let status_again = fixture.server("/ws/status/").await;

        // then (期待する結果):
        assert_eq!(status_again.url, "ws://chat.test/ws/status/?token=token-new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_user_after_logout_starts_clean() {
        // テスト項目: ログアウト後に別ユーザーがログインすると、前ユーザーの会話や選択中の会話を引き継がない
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let _alice_notification = fixture.server("/ws/notifications/").await;
        let (conversation, _status) = fixture.activate(CHAT).await;
        conversation.push_text(new_message(1, CHAT, 2, "for alice"));
        fixture
            .wait_state(|state| state.messages(CHAT).len() == 1)
            .await;
        let carol = Identity {
            user: profile("3", "Carol", "333"),
            access_token: "token-c".to_string(),
        };

        // when (操作):
        fixture.identity_tx.send_replace(None);
        let signed_out = fixture
            .wait_state(|state| state.active_chat_id.is_none())
            .await;
        fixture.identity_tx.send_replace(Some(carol));
        let notification = fixture.server("/ws/notifications/").await;
        fixture.wait_connected(ChannelKind::Notification).await;
        let state = fixture
            .wait_state(|state| state.messages(CHAT).is_empty())
            .await;

        // then (期待する結果):
        assert_eq!(signed_out.messages(CHAT).len(), 1);
        assert_eq!(
            notification.url,
            "ws://chat.test/ws/notifications/?token=token-c"
        );
        assert_eq!(state.active_chat_id, None);
        assert!(state.conversations.is_empty());
        let opened = fixture.transport.opened_urls();
        assert_eq!(opened.len(), 4);
        assert!(
            opened
                .iter()
                .filter(|url| url.ends_with("token=token-c"))
                .all(|url| url.contains("/ws/notifications/"))
        );
        assert_eq!(
            fixture.handle.send_text("hi").await,
            Err(SyncError::NoActiveConversation)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_from_replaced_channel_are_ignored() {
        // テスト項目: 切り替え前の会話チャネルから届いたイベントは反映されない
        // given (前提条件):
        let mut fixture = Fixture::signed_in();
        let (old_conversation, _old_status) = fixture.activate(CHAT).await;
        let (new_conversation, _new_status) = fixture.activate("chat_111_with_333").await;

        // when (操作):
        old_conversation.push_text(new_message(7, CHAT, 2, "late"));
        new_conversation.push_text(new_message(8, "chat_111_with_333", 2, "fresh"));
        let state = fixture
            .wait_state(|state| state.messages("chat_111_with_333").len() == 1)
            .await;

        // then (期待する結果):
        assert!(state.messages(CHAT).is_empty());
    }
}

use std::sync::Arc;

use chrono::Local;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    attachments::{self, InteractiveMessage},
    commands::{CommandError, CommandRouter, SlashCommandPayload},
    socket::{ChatApi, ChatApiError},
};

/// Events-API envelopes carry this outer discriminant when they wrap a
/// subscribed event; anything else is an unsupported envelope.
pub const CALLBACK_EVENT_TYPE: &str = "event_callback";

/// A raw envelope off the Socket Mode stream. The payload stays untyped
/// until the listener knows which category it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct SocketEnvelope {
    pub envelope_id: String,
    pub kind: EnvelopeKind,
    pub payload: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvelopeKind {
    EventsApi,
    SlashCommand,
    Interactive,
    Other(String),
}

impl EnvelopeKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "events_api" => Self::EventsApi,
            "slash_commands" => Self::SlashCommand,
            "interactive" => Self::Interactive,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EventsApi => "events_api",
            Self::SlashCommand => "slash_commands",
            Self::Interactive => "interactive",
            Self::Other(raw) => raw,
        }
    }
}

/// A classified inbound event. The union is closed on purpose: adding a
/// category is a compile error until every match handles it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    AppMention(AppMentionEvent),
    SlashCommand(SlashCommandPayload),
    Interaction(InteractionPayload),
    Unknown { event_type: String },
}

/// The typed events-API envelope inside an `events_api` socket payload.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EventsApiEnvelope {
    #[serde(rename = "type")]
    pub callback_type: String,
    pub event: CallbackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum CallbackEvent {
    #[serde(rename = "app_mention")]
    AppMention(AppMentionEvent),
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AppMentionEvent {
    pub user: String,
    pub text: String,
    pub channel: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InteractionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub actions: Vec<BlockAction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BlockAction {
    pub action_id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub selected_option: Option<SelectedOption>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SelectedOption {
    pub value: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    Lookup(ChatApiError),
    #[error("failed to post message: {0}")]
    Post(#[source] ChatApiError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Routes classified events to their handlers. All transport capabilities
/// arrive through the injected [`ChatApi`], never through global state.
pub struct EventDispatcher {
    mentions: MentionResponder,
    commands: CommandRouter,
    interactions: InteractionResponder,
}

impl EventDispatcher {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            mentions: MentionResponder::new(api.clone()),
            commands: CommandRouter::with_default_commands(api),
            interactions: InteractionResponder,
        }
    }

    pub fn with_router(api: Arc<dyn ChatApi>, commands: CommandRouter) -> Self {
        Self { mentions: MentionResponder::new(api), commands, interactions: InteractionResponder }
    }

    /// Dispatch one classified event. Slash commands may hand back a payload
    /// that the caller attaches to the envelope acknowledgment.
    pub async fn dispatch(
        &self,
        event: SlackEvent,
    ) -> Result<Option<InteractiveMessage>, DispatchError> {
        match event {
            SlackEvent::AppMention(event) => {
                self.mentions.respond(&event).await?;
                Ok(None)
            }
            SlackEvent::SlashCommand(payload) => {
                self.commands.route(payload).await.map_err(DispatchError::from)
            }
            SlackEvent::Interaction(payload) => {
                self.interactions.handle(&payload);
                Ok(None)
            }
            SlackEvent::Unknown { event_type } => {
                Err(DispatchError::UnsupportedEventType(event_type))
            }
        }
    }

    /// Dispatch a typed events-API envelope. A non-callback outer type is an
    /// explicit error; an unrecognized inner event is a silent no-op.
    pub async fn dispatch_events_api(
        &self,
        envelope: EventsApiEnvelope,
    ) -> Result<(), DispatchError> {
        if envelope.callback_type != CALLBACK_EVENT_TYPE {
            return self
                .dispatch(SlackEvent::Unknown { event_type: envelope.callback_type })
                .await
                .map(|_| ());
        }

        match envelope.event {
            CallbackEvent::AppMention(event) => {
                self.dispatch(SlackEvent::AppMention(event)).await.map(|_| ())
            }
            CallbackEvent::Other => {
                debug!("ignoring callback event with no registered handler");
                Ok(())
            }
        }
    }
}

/// Replies to app mentions: resolve the sender, build the reply, post it.
pub struct MentionResponder {
    api: Arc<dyn ChatApi>,
}

impl MentionResponder {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api }
    }

    pub async fn respond(&self, event: &AppMentionEvent) -> Result<(), HandlerError> {
        let user = self.api.user_info(&event.user).await.map_err(HandlerError::Lookup)?;
        let reply = attachments::mention_reply(&user.name, &event.text, Local::now());
        self.api.post_message(&event.channel, &reply).await.map_err(HandlerError::Post)
    }
}

/// Logs block actions and otherwise leaves interactions alone.
pub struct InteractionResponder;

impl InteractionResponder {
    pub fn handle(&self, payload: &InteractionPayload) {
        if payload.kind != "block_actions" {
            debug!(kind = %payload.kind, "ignoring interaction type");
            return;
        }

        for action in &payload.actions {
            let selected = action
                .selected_option
                .as_ref()
                .map(|option| option.value.as_str())
                .or(action.value.as_deref())
                .unwrap_or("none");
            info!(
                action_id = %action.action_id,
                selected = %selected,
                "interactive action received"
            );
        }
    }
}

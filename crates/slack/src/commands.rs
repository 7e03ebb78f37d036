use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    attachments::{self, InteractiveMessage},
    socket::{ChatApi, ChatApiError},
};

pub const HELLO_COMMAND: &str = "/hello";
pub const FEEDBACK_PROMPT_COMMAND: &str = "/feedback-prompt";

/// The slash-command payload delivered inside a `slash_commands` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub channel_id: String,
    pub user_name: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("failed to post message: {0}")]
    Post(#[source] ChatApiError),
}

/// A single slash command. A handler either performs its own send and
/// returns `None`, or returns a payload to ride the acknowledgment.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        payload: &SlashCommandPayload,
    ) -> Result<Option<InteractiveMessage>, CommandError>;
}

/// String-keyed registry from command literal to handler. Commands nobody
/// registered are a silent no-op, not an error.
#[derive(Default)]
pub struct CommandRouter {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_commands(api: Arc<dyn ChatApi>) -> Self {
        let mut router = Self::new();
        router.register(HELLO_COMMAND, HelloCommand::new(api));
        router.register(FEEDBACK_PROMPT_COMMAND, FeedbackPromptCommand);
        router
    }

    pub fn register<H>(&mut self, command: impl Into<String>, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.handlers.insert(command.into(), Arc::new(handler));
    }

    pub async fn route(
        &self,
        payload: SlashCommandPayload,
    ) -> Result<Option<InteractiveMessage>, CommandError> {
        let Some(handler) = self.handlers.get(payload.command.as_str()) else {
            debug!(command = %payload.command, "no handler registered for slash command");
            return Ok(None);
        };

        handler.handle(&payload).await
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// `/hello` - greets the command's free text and posts immediately.
pub struct HelloCommand {
    api: Arc<dyn ChatApi>,
}

impl HelloCommand {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CommandHandler for HelloCommand {
    async fn handle(
        &self,
        payload: &SlashCommandPayload,
    ) -> Result<Option<InteractiveMessage>, CommandError> {
        let reply = attachments::hello_reply(&payload.text, &payload.user_name, Local::now());
        self.api
            .post_message(&payload.channel_id, &reply)
            .await
            .map_err(CommandError::Post)?;
        Ok(None)
    }
}

/// `/feedback-prompt` - returns the Yes/No prompt without sending anything;
/// the payload rides back on the acknowledgment.
pub struct FeedbackPromptCommand;

#[async_trait]
impl CommandHandler for FeedbackPromptCommand {
    async fn handle(
        &self,
        _payload: &SlashCommandPayload,
    ) -> Result<Option<InteractiveMessage>, CommandError> {
        Ok(Some(attachments::feedback_prompt()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{
        CommandError, CommandHandler, CommandRouter, SlashCommandPayload, FEEDBACK_PROMPT_COMMAND,
        HELLO_COMMAND,
    };
    use crate::attachments::{InteractiveMessage, COLOR_SUCCESS};
    use crate::socket::testing::RecordingChatApi;

    fn payload(command: &str, text: &str, user_name: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            command: command.to_owned(),
            text: text.to_owned(),
            channel_id: "C1".to_owned(),
            user_name: user_name.to_owned(),
        }
    }

    #[tokio::test]
    async fn unknown_command_is_a_silent_no_op() {
        let api = Arc::new(RecordingChatApi::default());
        let router = CommandRouter::with_default_commands(api.clone());

        let result = router.route(payload("/unknown", "", "alice")).await;

        assert_eq!(result, Ok(None));
        assert!(api.posts().await.is_empty());
    }

    #[tokio::test]
    async fn hello_command_posts_greeting_and_returns_nothing() {
        let api = Arc::new(RecordingChatApi::default());
        let router = CommandRouter::with_default_commands(api.clone());

        let result = router.route(payload(HELLO_COMMAND, "world", "alice")).await;
        assert_eq!(result, Ok(None));

        let posts = api.posts().await;
        assert_eq!(posts.len(), 1);
        let (channel, attachment) = &posts[0];
        assert_eq!(channel, "C1");
        assert_eq!(attachment.text, "Hello world");
        assert_eq!(attachment.color, COLOR_SUCCESS);
        assert_eq!(attachment.fields[0].title, "Date");
        assert_eq!(attachment.fields[1].title, "Initializer");
        assert_eq!(attachment.fields[1].value, "alice");
    }

    #[tokio::test]
    async fn hello_command_wraps_send_failures() {
        let api = Arc::new(RecordingChatApi::failing_post("channel_not_found"));
        let router = CommandRouter::with_default_commands(api);

        let result = router.route(payload(HELLO_COMMAND, "world", "alice")).await;

        assert!(matches!(result, Err(CommandError::Post(_))));
    }

    #[tokio::test]
    async fn feedback_prompt_returns_payload_without_sending() {
        let api = Arc::new(RecordingChatApi::default());
        let router = CommandRouter::with_default_commands(api.clone());

        let result = router
            .route(payload(FEEDBACK_PROMPT_COMMAND, "", "alice"))
            .await
            .expect("feedback prompt routes");

        let message = result.expect("feedback prompt returns an ack payload");
        let labels: Vec<&str> = message.blocks[0]
            .options
            .iter()
            .map(|option| option.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Yes", "No"]);
        assert!(api.posts().await.is_empty());
    }

    #[tokio::test]
    async fn router_invokes_registered_custom_handlers() {
        struct RecordingHandler {
            calls: Arc<Mutex<Vec<String>>>,
        }

        #[async_trait]
        impl CommandHandler for RecordingHandler {
            async fn handle(
                &self,
                payload: &SlashCommandPayload,
            ) -> Result<Option<InteractiveMessage>, CommandError> {
                self.calls.lock().expect("lock").push(payload.text.clone());
                Ok(None)
            }
        }

        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut router = CommandRouter::new();
        router.register("/echo", RecordingHandler { calls: calls.clone() });
        assert_eq!(router.handler_count(), 1);

        router.route(payload("/echo", "ping", "alice")).await.expect("route");

        assert_eq!(&*calls.lock().expect("lock"), &["ping".to_owned()]);
    }

    #[test]
    fn slash_payload_deserializes_with_optional_text() {
        let payload: SlashCommandPayload = serde_json::from_value(serde_json::json!({
            "command": "/hello",
            "channel_id": "C1",
            "user_name": "alice"
        }))
        .expect("payload parses");

        assert_eq!(payload.command, "/hello");
        assert_eq!(payload.text, "");
    }
}

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attachments::{Attachment, InteractiveMessage};
use crate::commands::SlashCommandPayload;
use crate::events::{
    EnvelopeKind, EventDispatcher, EventsApiEnvelope, InteractionPayload, SlackEvent,
    SocketEnvelope,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatApiError {
    #[error("user lookup failed: {0}")]
    UserInfo(String),
    #[error("message post failed: {0}")]
    PostMessage(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
}

/// The Socket Mode side of the transport: envelopes in, acknowledgments out.
/// Slash-command acknowledgments may carry a reply payload.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SocketEnvelope>, TransportError>;
    async fn acknowledge(
        &self,
        envelope_id: &str,
        payload: Option<&InteractiveMessage>,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// The Web API side of the transport, shared read-only by every handler.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ChatApiError>;
    async fn post_message(
        &self,
        channel_id: &str,
        attachment: &Attachment,
    ) -> Result<(), ChatApiError>;
}

#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SocketEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(
        &self,
        _envelope_id: &str,
        _payload: Option<&InteractiveMessage>,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct NoopChatApi;

#[async_trait]
impl ChatApi for NoopChatApi {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ChatApiError> {
        Ok(UserInfo { name: user_id.to_owned() })
    }

    async fn post_message(
        &self,
        _channel_id: &str,
        _attachment: &Attachment,
    ) -> Result<(), ChatApiError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 500, max_delay_ms: 10_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// The single long-lived listener task. Pulls envelopes off the transport,
/// classifies them, acknowledges them per category, and dispatches to the
/// handlers. Events are processed strictly one at a time in arrival order;
/// the only suspension points are the select below and the handler calls.
pub struct SocketListener {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    cancel: CancellationToken,
    reconnect_policy: ReconnectPolicy,
}

impl SocketListener {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        cancel: CancellationToken,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, cancel, reconnect_policy }
    }

    pub async fn run(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            if self.cancel.is_cancelled() {
                info!("cancellation observed before connect; stopping listener");
                return Ok(());
            }

            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; stopping listener without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                info!("cancellation observed during reconnect backoff");
                                return Ok(());
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("shutting down socket mode listener");
                    return Ok(());
                }
                next = self.transport.next_envelope() => {
                    let Some(envelope) = next? else {
                        info!(attempt, "socket mode transport stream closed");
                        self.transport.disconnect().await?;
                        return Ok(());
                    };
                    self.process_envelope(envelope).await;
                }
            }
        }
    }

    async fn process_envelope(&self, envelope: SocketEnvelope) {
        let SocketEnvelope { envelope_id, kind, payload } = envelope;
        debug!(envelope_id = %envelope_id, kind = %kind.as_str(), "received socket envelope");

        match kind {
            EnvelopeKind::EventsApi => {
                let parsed: EventsApiEnvelope = match serde_json::from_value(payload) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        warn!(
                            envelope_id = %envelope_id,
                            error = %error,
                            "events api payload failed its type check; leaving envelope unacked for redelivery"
                        );
                        return;
                    }
                };

                // The token is consumed before dispatch; the reply (if any)
                // travels through chat.postMessage, not the ack.
                self.acknowledge(&envelope_id, None).await;
                if let Err(error) = self.dispatcher.dispatch_events_api(parsed).await {
                    warn!(
                        envelope_id = %envelope_id,
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            }
            EnvelopeKind::SlashCommand => {
                let parsed: SlashCommandPayload = match serde_json::from_value(payload) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        warn!(
                            envelope_id = %envelope_id,
                            error = %error,
                            "slash command payload failed its type check; leaving envelope unacked for redelivery"
                        );
                        return;
                    }
                };

                match self.dispatcher.dispatch(SlackEvent::SlashCommand(parsed)).await {
                    Ok(reply) => self.acknowledge(&envelope_id, reply.as_ref()).await,
                    Err(error) => {
                        warn!(
                            envelope_id = %envelope_id,
                            error = %error,
                            "slash command dispatch failed; acknowledging without payload"
                        );
                        self.acknowledge(&envelope_id, None).await;
                    }
                }
            }
            EnvelopeKind::Interactive => {
                let parsed: InteractionPayload = match serde_json::from_value(payload) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        warn!(
                            envelope_id = %envelope_id,
                            error = %error,
                            "interaction payload failed its type check; leaving envelope unacked for redelivery"
                        );
                        return;
                    }
                };

                if let Err(error) = self.dispatcher.dispatch(SlackEvent::Interaction(parsed)).await
                {
                    warn!(
                        envelope_id = %envelope_id,
                        error = %error,
                        "interaction dispatch failed; continuing socket loop"
                    );
                }
                // Interactions are acknowledged regardless of handler outcome.
                self.acknowledge(&envelope_id, None).await;
            }
            EnvelopeKind::Other(raw) => {
                debug!(envelope_id = %envelope_id, kind = %raw, "ignoring unhandled envelope type");
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str, payload: Option<&InteractiveMessage>) {
        if let Err(error) = self.transport.acknowledge(envelope_id, payload).await {
            warn!(
                envelope_id = %envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(envelope_id = %envelope_id, "acknowledged slack envelope");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{ChatApi, ChatApiError, UserInfo};
    use crate::attachments::Attachment;

    /// Shared call-order log for asserting ack-before-dispatch sequencing.
    pub(crate) type CallLog = Arc<StdMutex<Vec<&'static str>>>;

    #[derive(Default)]
    pub(crate) struct RecordingChatApi {
        user_name: Option<String>,
        lookup_error: Option<String>,
        post_error: Option<String>,
        log: Option<CallLog>,
        posts: Mutex<Vec<(String, Attachment)>>,
    }

    impl RecordingChatApi {
        pub(crate) fn with_user_name(name: &str) -> Self {
            Self { user_name: Some(name.to_owned()), ..Self::default() }
        }

        pub(crate) fn failing_lookup(reason: &str) -> Self {
            Self { lookup_error: Some(reason.to_owned()), ..Self::default() }
        }

        pub(crate) fn failing_post(reason: &str) -> Self {
            Self { post_error: Some(reason.to_owned()), ..Self::default() }
        }

        pub(crate) fn logged(mut self, log: CallLog) -> Self {
            self.log = Some(log);
            self
        }

        pub(crate) async fn posts(&self) -> Vec<(String, Attachment)> {
            self.posts.lock().await.clone()
        }
    }

    #[async_trait]
    impl ChatApi for RecordingChatApi {
        async fn user_info(&self, user_id: &str) -> Result<UserInfo, ChatApiError> {
            if let Some(reason) = &self.lookup_error {
                return Err(ChatApiError::UserInfo(reason.clone()));
            }
            let name = self.user_name.clone().unwrap_or_else(|| user_id.to_owned());
            Ok(UserInfo { name })
        }

        async fn post_message(
            &self,
            channel_id: &str,
            attachment: &Attachment,
        ) -> Result<(), ChatApiError> {
            if let Some(reason) = &self.post_error {
                return Err(ChatApiError::PostMessage(reason.clone()));
            }
            if let Some(log) = &self.log {
                log.lock().expect("log lock").push("post");
            }
            self.posts.lock().await.push((channel_id.to_owned(), attachment.clone()));
            Ok(())
        }
    }
}

//! Live Slack transport: Socket Mode over a websocket plus the Web API
//! endpoints the handlers call. Everything here is the network edge; the
//! envelope loop and handlers never see reqwest or tungstenite types.

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::attachments::{Attachment, InteractiveMessage};
use crate::events::{EnvelopeKind, SocketEnvelope};
use crate::socket::{ChatApi, ChatApiError, SocketTransport, TransportError, UserInfo};

const SLACK_API_BASE: &str = "https://slack.com/api";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// What a single websocket text frame turned out to be.
#[derive(Debug, PartialEq)]
enum Frame {
    Hello,
    Disconnect,
    Envelope(SocketEnvelope),
    Unparseable,
}

fn classify_frame(raw: &str) -> Frame {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return Frame::Unparseable,
    };

    match value.get("type").and_then(Value::as_str) {
        Some("hello") => return Frame::Hello,
        Some("disconnect") => return Frame::Disconnect,
        _ => {}
    }

    let Some(envelope_id) = value.get("envelope_id").and_then(Value::as_str) else {
        return Frame::Unparseable;
    };
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(EnvelopeKind::parse)
        .unwrap_or_else(|| EnvelopeKind::Other(String::new()));
    let payload = value.get("payload").cloned().unwrap_or(Value::Null);

    Frame::Envelope(SocketEnvelope { envelope_id: envelope_id.to_owned(), kind, payload })
}

/// Socket Mode transport backed by a real websocket. `connect` trades the
/// app-level token for a fresh websocket URL each time, so reconnecting is
/// just calling it again.
pub struct SocketModeTransport {
    http: reqwest::Client,
    app_token: SecretString,
    writer: Mutex<Option<WsSink>>,
    reader: Mutex<Option<WsSource>>,
}

impl SocketModeTransport {
    pub fn new(app_token: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            app_token,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    async fn request_socket_url(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .post(format!("{SLACK_API_BASE}/apps.connections.open"))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned();
            return Err(TransportError::Connect(format!(
                "apps.connections.open refused: {reason}"
            )));
        }

        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                TransportError::Connect("apps.connections.open returned no url".to_owned())
            })
    }

    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(TransportError::Acknowledge("websocket is not connected".to_owned()));
        };
        sink.send(Message::Text(frame))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }
}

#[async_trait]
impl SocketTransport for SocketModeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.request_socket_url().await?;
        let (stream, _response) = connect_async(&url)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(source);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SocketEnvelope>, TransportError> {
        let mut reader = self.reader.lock().await;
        let Some(source) = reader.as_mut() else {
            return Ok(None);
        };

        loop {
            let message = match source.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Receive("websocket stream ended".to_owned())),
            };

            match message {
                Message::Text(text) => match classify_frame(&text) {
                    Frame::Hello => {
                        debug!("socket mode hello received");
                    }
                    Frame::Disconnect => {
                        return Err(TransportError::Receive(
                            "server requested a reconnect".to_owned(),
                        ));
                    }
                    Frame::Envelope(envelope) => return Ok(Some(envelope)),
                    Frame::Unparseable => {
                        debug!(frame = %text, "ignoring unparseable socket frame");
                    }
                },
                Message::Ping(data) => {
                    let mut writer = self.writer.lock().await;
                    if let Some(sink) = writer.as_mut() {
                        if let Err(error) = sink.send(Message::Pong(data)).await {
                            warn!(error = %error, "failed to answer websocket ping");
                        }
                    }
                }
                Message::Close(_) => {
                    return Err(TransportError::Receive("websocket closed by peer".to_owned()));
                }
                _ => {}
            }
        }
    }

    async fn acknowledge(
        &self,
        envelope_id: &str,
        payload: Option<&InteractiveMessage>,
    ) -> Result<(), TransportError> {
        let mut ack = json!({ "envelope_id": envelope_id });
        if let Some(message) = payload {
            let rendered = serde_json::to_value(message)
                .map_err(|error| TransportError::Acknowledge(error.to_string()))?;
            ack["payload"] = rendered;
        }
        self.send_frame(ack.to_string()).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        if let Some(sink) = writer.as_mut() {
            if let Err(error) = sink.send(Message::Close(None)).await {
                debug!(error = %error, "close frame was not delivered");
            }
        }
        *writer = None;
        *self.reader.lock().await = None;
        Ok(())
    }
}

/// Web API client used by the handlers for lookups and replies.
pub struct WebApiClient {
    http: reqwest::Client,
    bot_token: SecretString,
}

impl WebApiClient {
    pub fn new(bot_token: SecretString) -> Self {
        Self { http: reqwest::Client::new(), bot_token }
    }

    async fn call(
        &self,
        method: &str,
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<Value, String> {
        let request = build(
            self.http
                .post(format!("{SLACK_API_BASE}/{method}"))
                .bearer_auth(self.bot_token.expose_secret()),
        );
        let body: Value = request
            .send()
            .await
            .map_err(|error| error.to_string())?
            .json()
            .await
            .map_err(|error| error.to_string())?;

        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(format!("{method} refused: {reason}"));
        }
        Ok(body)
    }
}

#[async_trait]
impl ChatApi for WebApiClient {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ChatApiError> {
        let body = self
            .call("users.info", |request| request.query(&[("user", user_id)]))
            .await
            .map_err(ChatApiError::UserInfo)?;

        let name = body
            .get("user")
            .and_then(|user| user.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ChatApiError::UserInfo("users.info response had no user name".to_owned())
            })?;
        Ok(UserInfo { name: name.to_owned() })
    }

    async fn post_message(
        &self,
        channel_id: &str,
        attachment: &Attachment,
    ) -> Result<(), ChatApiError> {
        self.call("chat.postMessage", |request| {
            request.json(&json!({
                "channel": channel_id,
                "attachments": [attachment],
            }))
        })
        .await
        .map_err(ChatApiError::PostMessage)?;
        Ok(())
    }
}

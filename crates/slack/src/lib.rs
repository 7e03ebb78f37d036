//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack interface for hola:
//! - **Socket Mode** (`socket`) - the listener loop and transport seams
//! - **Slash Commands** (`commands`) - `/hello`, `/feedback-prompt`
//! - **Events** (`events`) - app mentions, interactive callbacks, dispatch
//! - **Attachments** (`attachments`) - canned reply payloads
//! - **Live transport** (`live`) - WebSocket + Web API implementations
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `app_mention` events
//! 3. Add slash commands: `/hello`, `/feedback-prompt`
//! 4. Set env vars: `HOLA_SLACK_APP_TOKEN`, `HOLA_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack Socket Mode → SocketListener → EventDispatcher → Responders
//!                          ↓                                  ↓
//!                     acknowledgment ← ack payload     chat.postMessage
//! ```
//!
//! # Key Types
//!
//! - `SocketListener` - the single event loop with reconnection logic
//! - `EventDispatcher` - routes classified events to handlers
//! - `CommandRouter` - string-keyed slash command registry
//! - `SocketTransport` / `ChatApi` - injectable transport seams

pub mod attachments;
pub mod commands;
pub mod events;
pub mod live;
pub mod socket;

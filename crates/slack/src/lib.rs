//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack interface for skipper:
//! - **Socket Mode** (`socket`) - Envelope pump with reconnection logic
//! - **Events** (`events`) - Envelope parsing and bot-echo filtering
//! - **Client** (`client`) - Outbound posting and name resolution trait
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `message` and `app_mention` events
//! 3. Set env vars: `SKIPPER_SLACK_APP_TOKEN`, `SKIPPER_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack frames → SocketModeRunner → EventSink (server) → AgentCore
//!                                        ↓
//!                                   ChatClient → chat.postMessage
//! ```
//!
//! The concrete wire (WebSocket connection, Web API HTTP calls) plugs in
//! behind `SocketTransport` and `ChatClient`; this crate ships the protocol
//! logic and noop stand-ins.
//!
//! # Key Types
//!
//! - `SocketModeRunner` - Envelope event loop with reconnection logic
//! - `ChatClient` - Outbound posting and name resolution trait
//! - `EventSink` - Where parsed human messages land

pub mod client;
pub mod events;
pub mod socket;

pub use client::{BotIdentity, ChatClient, ClientError, NoopChatClient};
pub use events::{parse_envelope, EventParseError, SlackEnvelope, SlackEvent};
pub use socket::{
    EventSink, NoopSocketTransport, ReconnectPolicy, SocketModeRunner, SocketTransport,
    TransportError,
};

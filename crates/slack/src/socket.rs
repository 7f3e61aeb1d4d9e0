use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use skipper_core::event::InboundEvent;

use crate::events::{SlackEnvelope, SlackEvent};

const DEDUP_WINDOW: usize = 128;

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

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
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

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Where parsed human messages land. The server wires this to the agent.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_message(&self, event: InboundEvent) -> Result<()>;
}

/// Transport stand-in used until a concrete wire implementation is plugged
/// in. Reads an immediately closed stream.
#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    sink: Arc<dyn EventSink>,
    reconnect_policy: ReconnectPolicy,
    // Slack delivers both `message` and `app_mention` for mentions;
    // the (channel, ts) pair identifies the underlying message.
    seen: Mutex<VecDeque<(String, String)>>,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        sink: Arc<dyn EventSink>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, sink, reconnect_policy, seen: Mutex::new(VecDeque::new()) }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
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
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            if let Some(envelope_id) = envelope.envelope_id.as_deref() {
                if let Err(error) = self.transport.acknowledge(envelope_id).await {
                    warn!(envelope_id, %error, "failed to acknowledge envelope");
                } else {
                    debug!(envelope_id, "acknowledged envelope");
                }
            }

            match envelope.event {
                SlackEvent::Hello => {
                    debug!("socket mode handshake complete");
                }
                SlackEvent::Disconnect { reason } => {
                    info!(reason = %reason, "server requested a reconnect");
                    self.transport.disconnect().await?;
                    return Err(TransportError::Receive(format!(
                        "server disconnect: {reason}"
                    )));
                }
                SlackEvent::Ignored { reason } => {
                    debug!(reason = %reason, "skipping envelope");
                }
                SlackEvent::Message(event) => {
                    if self.already_seen(&event).await {
                        debug!(
                            channel = %event.channel,
                            ts = event.ts.as_deref().unwrap_or(""),
                            "duplicate delivery skipped"
                        );
                        continue;
                    }
                    if let Err(error) = self.sink.on_message(event).await {
                        warn!(%error, "message handling failed; continuing socket loop");
                    }
                }
            }
        }
    }

    async fn already_seen(&self, event: &InboundEvent) -> bool {
        let Some(ts) = event.ts.as_deref() else {
            return false;
        };
        let key = (event.channel.clone(), ts.to_string());
        let mut seen = self.seen.lock().await;
        if seen.contains(&key) {
            return true;
        }
        seen.push_back(key);
        if seen.len() > DEDUP_WINDOW {
            seen.pop_front();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use skipper_core::event::InboundEvent;

    use super::{
        EventSink, ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError,
    };
    use crate::events::{SlackEnvelope, SlackEvent};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<InboundEvent>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn on_message(&self, event: InboundEvent) -> anyhow::Result<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    connect_attempts: 0,
                    acknowledgements: Vec::new(),
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn message_envelope(envelope_id: &str, channel: &str, ts: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: Some(envelope_id.to_owned()),
            event: SlackEvent::Message(
                InboundEvent::new("hello", channel, "U1").with_ts(ts),
            ),
        }
    }

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(message_envelope("env-1", "C1", "1.0"))), Ok(None)],
        ));
        let sink = Arc::new(RecordingSink::default());
        let runner = SocketModeRunner::new(transport.clone(), sink.clone(), policy());

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));
        let sink = Arc::new(RecordingSink::default());
        let runner = SocketModeRunner::new(transport.clone(), sink, policy());

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn ignored_envelopes_are_acknowledged_but_not_delivered() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: Some("env-bot".to_owned()),
                    event: SlackEvent::Ignored { reason: "bot message".to_owned() },
                })),
                Ok(None),
            ],
        ));
        let sink = Arc::new(RecordingSink::default());
        let runner = SocketModeRunner::new(transport.clone(), sink.clone(), policy());

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.acknowledgements().await, vec!["env-bot"]);
        assert!(sink.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_deliveries_reach_the_sink_once() {
        // A mention arrives as both `app_mention` and `message` with the
        // same channel and ts.
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(message_envelope("env-1", "C1", "1.0"))),
                Ok(Some(message_envelope("env-2", "C1", "1.0"))),
                Ok(Some(message_envelope("env-3", "C1", "2.0"))),
                Ok(None),
            ],
        ));
        let sink = Arc::new(RecordingSink::default());
        let runner = SocketModeRunner::new(transport.clone(), sink.clone(), policy());

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2", "env-3"]);
        let events = sink.events.lock().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ts.as_deref(), Some("1.0"));
        assert_eq!(events[1].ts.as_deref(), Some("2.0"));
    }

    #[tokio::test]
    async fn server_disconnect_frames_trigger_a_reconnect() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: None,
                    event: SlackEvent::Disconnect { reason: "refresh_requested".to_owned() },
                })),
                Ok(None),
            ],
        ));
        let sink = Arc::new(RecordingSink::default());
        let runner = SocketModeRunner::new(transport.clone(), sink, policy());

        runner.start().await.expect("runner should not fail");
        assert_eq!(transport.connect_attempts().await, 2);
    }
}

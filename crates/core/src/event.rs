/// A normalized inbound chat message, decoupled from the Slack wire format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub text: String,
    pub channel: String,
    pub user: String,
    /// Parent thread timestamp when the message is a thread reply.
    pub thread_ts: Option<String>,
    /// Timestamp of the message itself.
    pub ts: Option<String>,
    /// Human-readable channel name, when the transport provides one.
    pub channel_name: Option<String>,
}

impl InboundEvent {
    pub fn new(
        text: impl Into<String>,
        channel: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            channel: channel.into(),
            user: user.into(),
            thread_ts: None,
            ts: None,
            channel_name: None,
        }
    }

    pub fn with_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    pub fn with_ts(mut self, ts: impl Into<String>) -> Self {
        self.ts = Some(ts.into());
        self
    }

    pub fn with_channel_name(mut self, channel_name: impl Into<String>) -> Self {
        self.channel_name = Some(channel_name.into());
        self
    }
}

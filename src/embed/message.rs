//! Platform-neutral snapshot of an inbound channel message.

/// What the engine needs to know about a message event.
///
/// Update events may be partial; missing content becomes an empty string,
/// which extraction treats the same as text without links.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: u64,
    pub channel_id: u64,
    pub content: String,
    /// Footer text of each embed currently attached to the message.
    pub embed_footers: Vec<String>,
    /// Number of embeds currently attached.
    pub embed_count: usize,
}

//! Normalized tweet content shared by the fetch backends and the renderer.

/// Tweet author details.
#[derive(Debug, Clone, Default)]
pub struct TweetUser {
    pub name: Option<String>,
    pub username: Option<String>,
    pub url: Option<String>,
    pub avatar: Option<String>,
}

/// A tweet quoted inside another tweet.
#[derive(Debug, Clone)]
pub struct QuotedTweet {
    pub name: Option<String>,
    pub username: Option<String>,
    pub text: Option<String>,
}

/// Canonical tweet record produced by either fetch backend.
///
/// Not persisted; carries no identity beyond the id it was fetched for.
#[derive(Debug, Clone, Default)]
pub struct Tweet {
    pub user: TweetUser,
    pub url: Option<String>,
    pub text: Option<String>,
    pub likes: Option<u64>,
    pub retweets: Option<u64>,
    pub replies: Option<u64>,
    /// Unix timestamp in seconds.
    pub timestamp: Option<i64>,
    pub quoted: Option<QuotedTweet>,
    pub media: Vec<String>,
    pub has_video: bool,
}

//! Tweet fetching over HTTP with two interchangeable backends.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::embed::engine::TweetSource;
use crate::embed::tweet::{QuotedTweet, Tweet, TweetUser};

const SYNDICATION_URL: &str = "https://cdn.syndication.twimg.com/tweet-result";

/// Delay between scrape attempts.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shortener links Twitter appends to tweet text.
static TCO_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://t\.co/[a-zA-Z0-9]+").expect("t.co pattern is valid"));

/// Which upstream the fetcher talks to, chosen once at startup.
pub enum Backend {
    /// Twitter's syndication CDN, with retries.
    Syndication { retry_limit: u32 },
    /// A vxTwitter-compatible mirror API.
    VxTwitter { api_url: Option<String> },
}

/// Resolves tweet ids to normalized tweet records.
pub struct TweetFetcher {
    client: reqwest::Client,
    backend: Backend,
}

impl TweetFetcher {
    pub fn new(client: reqwest::Client, backend: Backend) -> Self {
        Self { client, backend }
    }

    /// Fetch a tweet by id. `None` when the tweet cannot be resolved.
    pub async fn get_tweet(&self, id: &str) -> Option<Tweet> {
        match &self.backend {
            Backend::Syndication { retry_limit } => {
                self.fetch_from_syndication(id, *retry_limit).await
            }
            Backend::VxTwitter { api_url } => self.fetch_from_vx(id, api_url.as_deref()).await,
        }
    }

    async fn fetch_from_syndication(&self, id: &str, retry_limit: u32) -> Option<Tweet> {
        let mut payload: Option<SyndicationTweet> = None;

        for attempt in 1..=retry_limit {
            match self.request_syndication(id).await {
                Ok(Some(tweet)) => {
                    payload = Some(tweet);
                    break;
                }
                Ok(None) => debug!("Tweet {id} not available (attempt {attempt} / {retry_limit})"),
                Err(e) => {
                    info!("Failed to fetch tweet. Retrying... ({attempt} / {retry_limit}): {e}")
                }
            }

            if attempt < retry_limit {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        payload.map(normalize_syndication)
    }

    async fn request_syndication(&self, id: &str) -> Result<Option<SyndicationTweet>, String> {
        let url = format!("{SYNDICATION_URL}?id={id}&token={}", syndication_token(id));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(format!("API error {status}: {body}"));
        }
        if body.is_empty() {
            return Ok(None);
        }

        let tweet: SyndicationTweet =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {e}"))?;

        // Tombstoned tweets come back without an author payload.
        if tweet.user.is_none() {
            return Ok(None);
        }

        Ok(Some(tweet))
    }

    async fn fetch_from_vx(&self, id: &str, api_url: Option<&str>) -> Option<Tweet> {
        let base = api_url?;
        let url = vx_endpoint(base, id);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch tweet {id}: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("vxTwitter returned {} for tweet {id}", response.status());
            return None;
        }

        match response.json::<VxTweet>().await {
            Ok(payload) => Some(normalize_vx(payload)),
            Err(e) => {
                warn!("Failed to parse vxTwitter response for tweet {id}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl TweetSource for TweetFetcher {
    async fn get_tweet(&self, id: &str) -> Option<Tweet> {
        TweetFetcher::get_tweet(self, id).await
    }
}

fn vx_endpoint(base: &str, id: &str) -> String {
    let separator = if base.ends_with('/') { "" } else { "/" };
    format!("{base}{separator}tweet/status/{id}")
}

/// Request token the syndication endpoint derives from the tweet id.
fn syndication_token(id: &str) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let id: f64 = id.parse().unwrap_or(0.0);
    let value = (id / 1e15) * std::f64::consts::PI;

    let mut integral = value.trunc() as u64;
    let mut fractional = value.fract();

    let mut digits: Vec<char> = Vec::new();
    if integral == 0 {
        digits.push('0');
    }
    while integral > 0 {
        digits.push(DIGITS[(integral % 36) as usize] as char);
        integral /= 36;
    }
    digits.reverse();

    for _ in 0..10 {
        fractional *= 36.0;
        let digit = (fractional.trunc() as usize).min(35);
        digits.push(DIGITS[digit] as char);
        fractional = fractional.fract();
    }

    digits.into_iter().filter(|c| *c != '0').collect()
}

/// Remove t.co shortener links from tweet text.
fn strip_shortener_links(text: &str) -> String {
    TCO_LINK.replace_all(text, "").into_owned()
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp())
}

#[derive(Deserialize)]
struct SyndicationTweet {
    #[serde(rename = "id_str")]
    id: Option<String>,
    text: Option<String>,
    created_at: Option<String>,
    favorite_count: Option<u64>,
    conversation_count: Option<u64>,
    user: Option<SyndicationUser>,
    #[serde(default)]
    photos: Vec<SyndicationPhoto>,
    video: Option<SyndicationVideo>,
    quoted_tweet: Option<Box<SyndicationTweet>>,
}

#[derive(Deserialize)]
struct SyndicationUser {
    name: Option<String>,
    screen_name: Option<String>,
    profile_image_url_https: Option<String>,
}

#[derive(Deserialize)]
struct SyndicationPhoto {
    url: String,
}

#[derive(Deserialize)]
struct SyndicationVideo {
    poster: Option<String>,
}

fn normalize_syndication(payload: SyndicationTweet) -> Tweet {
    let user = payload.user.as_ref();
    let screen_name = user.and_then(|u| u.screen_name.clone());

    // The payload has no profile link of its own; derive it from the handle.
    let profile_url = screen_name.as_ref().map(|name| format!("https://twitter.com/{name}"));
    let url = match (&screen_name, &payload.id) {
        (Some(name), Some(id)) => Some(format!("https://twitter.com/{name}/status/{id}")),
        _ => profile_url.clone(),
    };

    let media: Vec<String> = payload
        .photos
        .iter()
        .map(|photo| photo.url.clone())
        .chain(payload.video.as_ref().and_then(|video| video.poster.clone()))
        .collect();

    Tweet {
        user: TweetUser {
            name: user.and_then(|u| u.name.clone()),
            username: screen_name,
            url: profile_url,
            avatar: user.and_then(|u| u.profile_image_url_https.clone()),
        },
        url,
        text: payload.text.as_deref().map(strip_shortener_links),
        likes: payload.favorite_count,
        retweets: None,
        replies: payload.conversation_count,
        timestamp: payload.created_at.as_deref().and_then(parse_timestamp),
        quoted: payload.quoted_tweet.map(|quote| QuotedTweet {
            name: quote.user.as_ref().and_then(|u| u.name.clone()),
            username: quote.user.as_ref().and_then(|u| u.screen_name.clone()),
            text: quote.text.as_deref().map(strip_shortener_links),
        }),
        has_video: payload.video.is_some(),
        media,
    }
}

#[derive(Deserialize)]
struct VxTweet {
    text: String,
    likes: Option<u64>,
    retweets: Option<u64>,
    replies: Option<u64>,
    date_epoch: Option<i64>,
    #[serde(rename = "tweetURL")]
    tweet_url: Option<String>,
    user_name: Option<String>,
    user_screen_name: Option<String>,
    user_profile_image_url: Option<String>,
    #[serde(default)]
    media_extended: Vec<VxMedia>,
    qrt: Option<Box<VxTweet>>,
}

#[derive(Deserialize)]
struct VxMedia {
    thumbnail_url: String,
    #[serde(rename = "type")]
    kind: String,
}

fn normalize_vx(payload: VxTweet) -> Tweet {
    Tweet {
        user: TweetUser {
            name: payload.user_name.clone(),
            username: payload.user_screen_name.clone(),
            url: payload
                .user_screen_name
                .as_ref()
                .map(|name| format!("https://twitter.com/{name}")),
            avatar: payload.user_profile_image_url.clone(),
        },
        url: payload.tweet_url.clone(),
        text: Some(strip_shortener_links(&payload.text)),
        likes: payload.likes,
        retweets: payload.retweets,
        replies: payload.replies,
        timestamp: payload.date_epoch,
        media: payload
            .media_extended
            .iter()
            .map(|media| media.thumbnail_url.clone())
            .collect(),
        has_video: payload.media_extended.iter().any(|media| media.kind == "video"),
        quoted: payload.qrt.map(|quote| QuotedTweet {
            name: quote.user_name.clone(),
            username: quote.user_screen_name.clone(),
            text: Some(strip_shortener_links(&quote.text)),
        }),
    }
}

//! Renders normalized tweets into platform-neutral embed cards.

use crate::config::ExternalEmoji;
use crate::embed::tweet::Tweet;

/// Footer text stamped on every primary card. The update path recognizes the
/// bot's own replies by this exact string, so it must not change.
pub const OWN_EMBED_FOOTER: &str = "Twitter";

const TWITTER_COLOR: u32 = 0x1da1f2;
const FOOTER_ICON: &str = "https://abs.twimg.com/icons/apple-touch-icon-192x192.png";
const DEFAULT_AVATAR: &str =
    "https://abs.twimg.com/sticky/default_profile_images/default_profile_400x400.png";
const FALLBACK_URL: &str = "https://twitter.com/";

/// Inline name/value pair on a card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardField {
    pub name: String,
    pub value: String,
}

/// Platform-neutral embed card.
#[derive(Debug, Clone, Default)]
pub struct Card {
    pub author_name: Option<String>,
    pub author_icon: Option<String>,
    pub author_url: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub fields: Vec<CardField>,
    pub footer_text: Option<String>,
    pub footer_icon: Option<String>,
    /// Unix timestamp in seconds.
    pub timestamp: Option<i64>,
    pub color: Option<u32>,
}

/// Link-style button attached below the cards.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Cards and buttons ready to post as one reply.
#[derive(Debug, Clone, Default)]
pub struct RenderedReply {
    pub cards: Vec<Card>,
    pub buttons: Vec<LinkButton>,
}

/// Build the reply cards for a list of tweets.
///
/// Each tweet yields one primary card; media beyond the first item becomes
/// minimal follow-up cards sharing the tweet's permalink, and tweets with
/// video get a link button.
pub fn render(tweets: &[Tweet], emoji: &ExternalEmoji) -> RenderedReply {
    let mut reply = RenderedReply::default();

    for tweet in tweets {
        let url = tweet.url.clone().unwrap_or_else(|| FALLBACK_URL.to_string());
        let mut description = tweet.text.clone().unwrap_or_default();

        if let Some(ref quote) = tweet.quoted {
            description.push_str(&format!(
                "\n\n>>> {} (@{}): {}",
                quote.name.as_deref().unwrap_or("Unknown"),
                quote.username.as_deref().unwrap_or("----"),
                quote.text.as_deref().unwrap_or(""),
            ));
        }

        let mut card = Card {
            author_name: Some(format!(
                "{} (@{})",
                tweet.user.name.as_deref().unwrap_or("Unknown"),
                tweet.user.username.as_deref().unwrap_or("----"),
            )),
            author_icon: Some(
                tweet.user.avatar.clone().unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            ),
            author_url: Some(tweet.user.url.clone().unwrap_or_else(|| FALLBACK_URL.to_string())),
            url: Some(url.clone()),
            footer_text: Some(OWN_EMBED_FOOTER.to_string()),
            footer_icon: Some(FOOTER_ICON.to_string()),
            timestamp: tweet.timestamp,
            color: Some(TWITTER_COLOR),
            ..Default::default()
        };

        if let Some((like, retweet, reply_emoji)) = emoji.complete() {
            description.push_str(&format!(
                "\n\n{}{}  {}{}  {}{}",
                like,
                tweet.likes.unwrap_or(0),
                retweet,
                tweet.retweets.unwrap_or(0),
                reply_emoji,
                tweet.replies.unwrap_or(0),
            ));
        } else {
            card.fields.push(CardField {
                name: "Likes".to_string(),
                value: tweet.likes.unwrap_or(0).to_string(),
            });
            card.fields.push(CardField {
                name: "Retweets".to_string(),
                value: tweet.retweets.unwrap_or(0).to_string(),
            });
        }

        card.description = Some(description);

        let mut extra_cards: Vec<Card> = Vec::new();
        for (i, media_url) in tweet.media.iter().enumerate() {
            if i == 0 {
                card.image = Some(media_url.clone());
            } else {
                extra_cards.push(Card {
                    url: Some(url.clone()),
                    image: Some(media_url.clone()),
                    ..Default::default()
                });
            }
        }

        if tweet.has_video {
            reply.buttons.push(LinkButton {
                label: "Watch video on Twitter".to_string(),
                url: url.clone(),
            });
        }

        reply.cards.push(card);
        reply.cards.extend(extra_cards);
    }

    reply
}

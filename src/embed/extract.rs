//! Tweet link extraction from message text.

use regex::Regex;
use std::sync::LazyLock;

static TWEET_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:x|twitter)\.com/[0-9A-Za-z_]{1,15}/status/([0-9]+)")
        .expect("tweet link pattern is valid")
});

/// Extract tweet ids from message text.
///
/// Ids are deduplicated and kept in first-seen order. Returns `None` when the
/// text contains no tweet links, so callers branch on absence rather than on
/// an empty set.
pub fn extract_tweet_ids(text: &str) -> Option<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();

    for caps in TWEET_LINK.captures_iter(text) {
        let id = &caps[1];
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }

    if ids.is_empty() { None } else { Some(ids) }
}

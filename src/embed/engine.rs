//! Embed lifecycle engine - correlates source messages to embed replies.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::ExternalEmoji;
use crate::embed::database::Database;
use crate::embed::extract::extract_tweet_ids;
use crate::embed::message::ChannelMessage;
use crate::embed::render::{OWN_EMBED_FOOTER, RenderedReply, render};
use crate::embed::tweet::Tweet;
use crate::embed::watch::SuppressWatch;

/// Outbound chat operations the engine drives.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post a reply to a source message; returns the new message id.
    async fn reply(
        &self,
        channel_id: u64,
        source_id: u64,
        content: &RenderedReply,
    ) -> Result<u64, String>;

    /// Edit an existing reply in place.
    async fn edit(
        &self,
        channel_id: u64,
        reply_id: u64,
        content: &RenderedReply,
    ) -> Result<(), String>;

    /// Delete a reply message.
    async fn delete(&self, channel_id: u64, reply_id: u64) -> Result<(), String>;

    /// Hide the platform's native link preview on a message.
    async fn suppress(&self, channel_id: u64, message_id: u64) -> Result<(), String>;
}

/// Resolves a tweet id to normalized content.
#[async_trait]
pub trait TweetSource: Send + Sync {
    async fn get_tweet(&self, id: &str) -> Option<Tweet>;
}

/// The embed lifecycle engine.
///
/// Consumes message events, decides create/update/skip/delete, and keeps the
/// correlation store and the suppression watch in sync. Events are not
/// serialized per source message; concurrent edits to the same message can
/// race against an in-flight creation.
pub struct EmbedEngine {
    chat: Arc<dyn ChatApi>,
    tweets: Arc<dyn TweetSource>,
    database: Arc<Database>,
    emoji: ExternalEmoji,
    watch: Mutex<SuppressWatch>,
}

impl EmbedEngine {
    pub fn new(
        chat: Arc<dyn ChatApi>,
        tweets: Arc<dyn TweetSource>,
        database: Arc<Database>,
        emoji: ExternalEmoji,
    ) -> Self {
        Self {
            chat,
            tweets,
            database,
            emoji,
            watch: Mutex::new(SuppressWatch::new()),
        }
    }

    /// Handle a newly created message.
    pub async fn handle_created(&self, msg: ChannelMessage) {
        let Some(tweet_ids) = extract_tweet_ids(&msg.content) else {
            return;
        };

        self.watch.lock().unwrap().mark(msg.id);
        info!("Message created: {}", msg.id);

        // All fetches failing means no reply; the watch entry is left for
        // TTL eviction.
        let Some(rendered) = self.render_tweets(&tweet_ids).await else {
            return;
        };

        let reply_id = match self.chat.reply(msg.channel_id, msg.id, &rendered).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to send embed reply for {}: {e}", msg.id);
                return;
            }
        };

        self.suppress_preview(&msg).await;

        self.database.insert(&msg.id.to_string(), &reply_id.to_string(), &tweet_ids);
    }

    /// Handle an edited message. Update events may be partial.
    pub async fn handle_updated(&self, msg: ChannelMessage) {
        let new_ids = extract_tweet_ids(&msg.content);

        // The platform can race-attach its own preview after our suppress
        // call; a fingerprinted footer means the attached embed is ours.
        if new_ids.is_some() && msg.embed_footers.iter().any(|text| text == OWN_EMBED_FOOTER) {
            self.watch.lock().unwrap().mark(msg.id);
        }

        self.suppress_preview(&msg).await;

        let Some(record) = self.database.get_one(&msg.id.to_string()) else {
            return;
        };

        let Some(new_ids) = new_ids else {
            // The edit removed every tweet link.
            self.delete_embeds(msg.channel_id, msg.id).await;
            return;
        };

        if same_id_set(&record.tweet_ids, &new_ids) {
            info!("Skipping message update for {}", msg.id);
            return;
        }

        if msg.embed_count > 0 {
            // The platform attached its own preview first; drop ours rather
            // than risk duplicate cards.
            self.delete_embeds(msg.channel_id, msg.id).await;
            return;
        }

        let Some(rendered) = self.render_tweets(&new_ids).await else {
            self.delete_embeds(msg.channel_id, msg.id).await;
            return;
        };

        let reply_id = match record.reply.parse::<u64>() {
            Ok(id) => id,
            Err(_) => {
                warn!("Invalid reply id in record for {}: {}", msg.id, record.reply);
                return;
            }
        };

        if let Err(e) = self.chat.edit(msg.channel_id, reply_id, &rendered).await {
            warn!("Failed to edit embed reply {reply_id}: {e}");
            return;
        }

        self.database.update(&msg.id.to_string(), &new_ids);
        info!("Message updated: {}", msg.id);
    }

    /// Handle a deleted message.
    pub async fn handle_deleted(&self, channel_id: u64, message_id: u64) {
        self.delete_embeds(channel_id, message_id).await;
    }

    /// Fetch and render the tweets for an id set, skipping unresolvable ids.
    /// `None` when nothing could be fetched.
    async fn render_tweets(&self, tweet_ids: &[String]) -> Option<RenderedReply> {
        let mut tweets: Vec<Tweet> = Vec::new();

        for id in tweet_ids {
            info!("Detected tweet: {id}");
            match self.tweets.get_tweet(id).await {
                Some(tweet) => tweets.push(tweet),
                None => warn!("Could not resolve tweet {id}"),
            }
        }

        if tweets.is_empty() {
            return None;
        }

        Some(render(&tweets, &self.emoji))
    }

    /// Delete every reply recorded for a source message and drop the records.
    ///
    /// The store can return multiple rows per source even though the create
    /// path only ever writes one; all of them are handled.
    async fn delete_embeds(&self, channel_id: u64, message_id: u64) {
        let records = self.database.get_all(&message_id.to_string());
        if records.is_empty() {
            return;
        }

        for record in &records {
            let Ok(reply_id) = record.reply.parse::<u64>() else {
                continue;
            };
            if let Err(e) = self.chat.delete(channel_id, reply_id).await {
                warn!("Failed to delete embed reply {}: {e}", record.reply);
            }
        }

        self.database.remove(&message_id.to_string());
    }

    /// Suppress the native preview on a watched message, then evict stale
    /// watch entries.
    async fn suppress_preview(&self, msg: &ChannelMessage) {
        if !self.watch.lock().unwrap().take(msg.id) {
            return;
        }

        if let Err(e) = self.chat.suppress(msg.channel_id, msg.id).await {
            warn!("Failed to suppress native preview on {}. Check the bot's permissions: {e}", msg.id);
        }

        self.watch.lock().unwrap().sweep();
    }

    #[cfg(test)]
    fn watch_len(&self) -> usize {
        self.watch.lock().unwrap().len()
    }
}

/// Same cardinality and same membership, ignoring order.
fn same_id_set(old: &[String], new: &[String]) -> bool {
    old.len() == new.len() && old.iter().all(|id| new.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[derive(Debug, Clone, PartialEq)]
    enum ChatCall {
        Reply { channel: u64, source: u64, cards: usize },
        Edit { reply: u64, cards: usize },
        Delete { reply: u64 },
        Suppress { message: u64 },
    }

    #[derive(Default)]
    struct RecordingChat {
        calls: Mutex<Vec<ChatCall>>,
        next_reply_id: Mutex<u64>,
        failing_deletes: Mutex<HashSet<u64>>,
    }

    impl RecordingChat {
        fn calls(&self) -> Vec<ChatCall> {
            self.calls.lock().unwrap().clone()
        }

        fn fail_delete(&self, reply_id: u64) {
            self.failing_deletes.lock().unwrap().insert(reply_id);
        }
    }

    #[async_trait]
    impl ChatApi for RecordingChat {
        async fn reply(
            &self,
            channel_id: u64,
            source_id: u64,
            content: &RenderedReply,
        ) -> Result<u64, String> {
            self.calls.lock().unwrap().push(ChatCall::Reply {
                channel: channel_id,
                source: source_id,
                cards: content.cards.len(),
            });
            let mut next = self.next_reply_id.lock().unwrap();
            *next += 1;
            Ok(1000 + *next)
        }

        async fn edit(
            &self,
            _channel_id: u64,
            reply_id: u64,
            content: &RenderedReply,
        ) -> Result<(), String> {
            self.calls.lock().unwrap().push(ChatCall::Edit {
                reply: reply_id,
                cards: content.cards.len(),
            });
            Ok(())
        }

        async fn delete(&self, _channel_id: u64, reply_id: u64) -> Result<(), String> {
            self.calls.lock().unwrap().push(ChatCall::Delete { reply: reply_id });
            if self.failing_deletes.lock().unwrap().contains(&reply_id) {
                return Err("Missing Access".to_string());
            }
            Ok(())
        }

        async fn suppress(&self, _channel_id: u64, message_id: u64) -> Result<(), String> {
            self.calls.lock().unwrap().push(ChatCall::Suppress { message: message_id });
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTweets {
        known: HashMap<String, Tweet>,
        fetches: Mutex<Vec<String>>,
    }

    impl FakeTweets {
        fn with_ids(ids: &[&str]) -> Self {
            let known = ids
                .iter()
                .map(|id| {
                    let tweet = Tweet {
                        url: Some(format!("https://twitter.com/alice/status/{id}")),
                        text: Some(format!("tweet {id}")),
                        ..Default::default()
                    };
                    (id.to_string(), tweet)
                })
                .collect();
            Self { known, fetches: Mutex::new(Vec::new()) }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TweetSource for FakeTweets {
        async fn get_tweet(&self, id: &str) -> Option<Tweet> {
            self.fetches.lock().unwrap().push(id.to_string());
            self.known.get(id).cloned()
        }
    }

    fn engine_with(
        chat: Arc<RecordingChat>,
        tweets: Arc<FakeTweets>,
    ) -> (EmbedEngine, Arc<Database>) {
        let database = Arc::new(Database::new());
        let engine = EmbedEngine::new(
            chat,
            tweets,
            database.clone(),
            ExternalEmoji::default(),
        );
        (engine, database)
    }

    fn msg(id: u64, content: &str) -> ChannelMessage {
        ChannelMessage {
            id,
            channel_id: 77,
            content: content.to_string(),
            embed_footers: vec![],
            embed_count: 0,
        }
    }

    #[tokio::test]
    async fn test_created_without_links_is_noop() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::default());
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine.handle_created(msg(1, "hello everyone")).await;

        assert!(chat.calls().is_empty());
        assert_eq!(tweets.fetch_count(), 0);
        assert_eq!(database.count(), 0);
        assert_eq!(engine.watch_len(), 0);
    }

    #[tokio::test]
    async fn test_created_replies_suppresses_and_records() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42"]));
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_created(msg(1, "check this https://x.com/alice/status/42"))
            .await;

        assert_eq!(
            chat.calls(),
            vec![
                ChatCall::Reply { channel: 77, source: 1, cards: 1 },
                ChatCall::Suppress { message: 1 },
            ]
        );

        let record = database.get_one("1").unwrap();
        assert_eq!(record.reply, "1001");
        assert_eq!(record.tweet_ids, vec!["42".to_string()]);
        assert_eq!(engine.watch_len(), 0);
    }

    #[tokio::test]
    async fn test_created_partial_success_renders_resolved_ids() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["1", "3"]));
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_created(msg(
                5,
                "https://x.com/a/status/1 https://x.com/b/status/2 https://x.com/c/status/3",
            ))
            .await;

        assert_eq!(
            chat.calls()[0],
            ChatCall::Reply { channel: 77, source: 5, cards: 2 }
        );
        // The record keeps the full extracted set.
        let record = database.get_one("5").unwrap();
        assert_eq!(
            record.tweet_ids,
            vec!["1".to_string(), "2".to_string(), "3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_created_all_fetches_failed_leaves_watch_entry() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::default());
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_created(msg(7, "https://x.com/alice/status/42"))
            .await;

        assert!(chat.calls().is_empty());
        assert_eq!(database.count(), 0);
        // Entry stays until a later suppression attempt sweeps it.
        assert_eq!(engine.watch_len(), 1);
    }

    #[tokio::test]
    async fn test_update_with_identical_set_skips_rerender() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42"]));
        let (engine, _database) = engine_with(chat.clone(), tweets.clone());

        let content = "check this https://x.com/alice/status/42";
        engine.handle_created(msg(1, content)).await;
        let calls_after_create = chat.calls().len();
        let fetches_after_create = tweets.fetch_count();

        engine.handle_updated(msg(1, content)).await;

        assert_eq!(chat.calls().len(), calls_after_create);
        assert_eq!(tweets.fetch_count(), fetches_after_create);
    }

    #[tokio::test]
    async fn test_update_with_new_id_edits_reply_and_record() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42", "99"]));
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_created(msg(1, "https://x.com/alice/status/42"))
            .await;
        engine
            .handle_updated(msg(1, "https://x.com/alice/status/42 https://x.com/bob/status/99"))
            .await;

        assert!(chat.calls().contains(&ChatCall::Edit { reply: 1001, cards: 2 }));
        let record = database.get_one("1").unwrap();
        assert_eq!(record.tweet_ids, vec!["42".to_string(), "99".to_string()]);
    }

    #[tokio::test]
    async fn test_update_without_record_does_nothing() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42"]));
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_updated(msg(1, "https://x.com/alice/status/42"))
            .await;

        assert!(chat.calls().is_empty());
        assert_eq!(database.count(), 0);
    }

    #[tokio::test]
    async fn test_update_removing_links_deletes_reply() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42"]));
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_created(msg(1, "https://x.com/alice/status/42"))
            .await;
        engine.handle_updated(msg(1, "nothing to see here")).await;

        assert!(chat.calls().contains(&ChatCall::Delete { reply: 1001 }));
        assert_eq!(database.count(), 0);
    }

    #[tokio::test]
    async fn test_update_with_native_embed_deletes_reply() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42", "99"]));
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_created(msg(1, "https://x.com/alice/status/42"))
            .await;

        let mut updated = msg(1, "https://x.com/bob/status/99");
        updated.embed_count = 1;
        engine.handle_updated(updated).await;

        assert!(chat.calls().contains(&ChatCall::Delete { reply: 1001 }));
        assert!(!chat.calls().iter().any(|c| matches!(c, ChatCall::Edit { .. })));
        assert_eq!(database.count(), 0);
    }

    #[tokio::test]
    async fn test_update_render_failure_deletes_reply() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42"]));
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        engine
            .handle_created(msg(1, "https://x.com/alice/status/42"))
            .await;
        // Id 43 never resolves.
        engine
            .handle_updated(msg(1, "https://x.com/alice/status/43"))
            .await;

        assert!(chat.calls().contains(&ChatCall::Delete { reply: 1001 }));
        assert_eq!(database.count(), 0);
    }

    #[tokio::test]
    async fn test_update_with_own_footer_retriggers_suppression() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::with_ids(&["42"]));
        let (engine, _database) = engine_with(chat.clone(), tweets.clone());

        let mut updated = msg(9, "https://x.com/alice/status/42");
        updated.embed_footers = vec![OWN_EMBED_FOOTER.to_string()];
        engine.handle_updated(updated).await;

        // No record exists, but the fingerprinted footer re-armed the watch
        // and suppression fired.
        assert_eq!(chat.calls(), vec![ChatCall::Suppress { message: 9 }]);
    }

    #[tokio::test]
    async fn test_deleted_removes_every_record_and_reply() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::default());
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        let ids = vec!["42".to_string()];
        database.insert("5", "2001", &ids);
        database.insert("5", "2002", &ids);

        engine.handle_deleted(77, 5).await;

        assert_eq!(
            chat.calls(),
            vec![ChatCall::Delete { reply: 2001 }, ChatCall::Delete { reply: 2002 }]
        );
        assert_eq!(database.count(), 0);
    }

    #[tokio::test]
    async fn test_deleted_with_failing_delete_still_clears_store() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::default());
        let (engine, database) = engine_with(chat.clone(), tweets.clone());

        let ids = vec!["42".to_string()];
        database.insert("5", "2001", &ids);
        database.insert("5", "2002", &ids);
        chat.fail_delete(2001);

        engine.handle_deleted(77, 5).await;

        assert_eq!(
            chat.calls(),
            vec![ChatCall::Delete { reply: 2001 }, ChatCall::Delete { reply: 2002 }]
        );
        assert_eq!(database.count(), 0);
    }

    #[tokio::test]
    async fn test_deleted_without_records_is_noop() {
        let chat = Arc::new(RecordingChat::default());
        let tweets = Arc::new(FakeTweets::default());
        let (engine, _database) = engine_with(chat.clone(), tweets.clone());

        engine.handle_deleted(77, 404).await;

        assert!(chat.calls().is_empty());
    }

    #[test]
    fn test_same_id_set_ignores_order() {
        let a = vec!["1".to_string(), "2".to_string()];
        let b = vec!["2".to_string(), "1".to_string()];
        assert!(same_id_set(&a, &b));
    }

    #[test]
    fn test_same_id_set_rejects_different_members() {
        let a = vec!["1".to_string(), "2".to_string()];
        let b = vec!["1".to_string(), "3".to_string()];
        assert!(!same_id_set(&a, &b));
        assert!(!same_id_set(&a, &a[..1]));
    }
}

mod config;
mod embed;

use std::sync::Arc;
use std::time::Duration;

use serenity::async_trait;
use serenity::gateway::ActivityData;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::prelude::*;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use config::Config;
use embed::{Backend, ChannelMessage, Database, DiscordChat, EmbedEngine, TweetFetcher};

/// How often the presence text is refreshed.
const STATUS_REFRESH: Duration = Duration::from_secs(300);

struct Handler {
    engine: Arc<EmbedEngine>,
    database: Arc<Database>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Logged in as {}", ready.user.tag());

        // Presence shows how many embeds the bot is tracking.
        let database = self.database.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATUS_REFRESH);
            loop {
                interval.tick().await;
                let count = database.count();
                ctx.set_activity(Some(ActivityData::playing(format!(
                    "Embedding {count} tweets"
                ))));
            }
        });
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        self.engine.handle_created(snapshot_message(&msg)).await;
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        self.engine.handle_updated(snapshot_update(&event)).await;
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        self.engine
            .handle_deleted(channel_id.get(), deleted_message_id.get())
            .await;
    }
}

fn snapshot_message(msg: &Message) -> ChannelMessage {
    ChannelMessage {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        content: msg.content.clone(),
        embed_footers: msg
            .embeds
            .iter()
            .filter_map(|embed| embed.footer.as_ref().map(|footer| footer.text.clone()))
            .collect(),
        embed_count: msg.embeds.len(),
    }
}

/// Update events carry partial message objects.
fn snapshot_update(event: &MessageUpdateEvent) -> ChannelMessage {
    let embeds = event.embeds.as_deref().unwrap_or(&[]);
    ChannelMessage {
        id: event.id.get(),
        channel_id: event.channel_id.get(),
        content: event.content.clone().unwrap_or_default(),
        embed_footers: embeds
            .iter()
            .filter_map(|embed| embed.footer.as_ref().map(|footer| footer.text.clone()))
            .collect(),
        embed_count: embeds.len(),
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "embeddir.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    std::fs::create_dir_all(&config.log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join("embeddir.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting embeddir...");
    info!("Loaded config from {config_path}");

    let database = Arc::new(Database::load_or_new(&config.database_path));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client");

    let backend = if config.use_vx_twitter {
        Backend::VxTwitter { api_url: config.vx_twitter_api_url.clone() }
    } else {
        Backend::Syndication { retry_limit: config.retry_limit }
    };
    let fetcher = Arc::new(TweetFetcher::new(client, backend));

    let http = Arc::new(Http::new(&config.discord_token));
    let chat = Arc::new(DiscordChat::new(http));

    let engine = Arc::new(EmbedEngine::new(
        chat,
        fetcher,
        database.clone(),
        config.external_emoji.clone(),
    ));

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut discord = Client::builder(&config.discord_token, intents)
        .event_handler(Handler { engine, database })
        .await
        .expect("Failed to create Discord client");

    if let Err(e) = discord.start().await {
        error!("Discord client error: {e}");
    }
}

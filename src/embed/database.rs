//! Persistent SQLite store correlating source messages to embed replies.

use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// One source-message-to-reply correlation row.
#[derive(Debug, Clone)]
pub struct EmbedRecord {
    /// Id of the source message that contained the tweet links.
    pub parent: String,
    /// Id of the bot's reply message.
    pub reply: String,
    /// Tweet ids last rendered for the source message.
    pub tweet_ids: Vec<String>,
    /// Epoch millis when the record was created.
    pub created_at: i64,
}

/// Persistent store for embed correlations.
///
/// The storage layer does not enforce one record per parent; the lifecycle
/// engine is responsible for that invariant.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();
        db
    }

    /// Open the store at the given path, creating it if missing.
    pub fn load_or_new(path: &Path) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();

        info!("Loaded database from {:?} ({} embeds)", path, db.count());

        db
    }

    fn init_schema(&self) {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeds (
                parent TEXT NOT NULL,
                reply TEXT NOT NULL,
                tweet_ids TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_embeds_parent ON embeds(parent);
            "#,
        )
        .expect("Failed to initialize database schema");
    }

    /// Record a new embed reply for a source message.
    pub fn insert(&self, parent: &str, reply: &str, tweet_ids: &[String]) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO embeds (parent, reply, tweet_ids, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                parent,
                reply,
                tweet_ids.join(","),
                chrono::Utc::now().timestamp_millis()
            ],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to insert embed record: {e}");
            0
        });
    }

    /// Replace the tweet ids stored for a source message.
    pub fn update(&self, parent: &str, tweet_ids: &[String]) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE embeds SET tweet_ids = ?1 WHERE parent = ?2",
            params![tweet_ids.join(","), parent],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to update embed record: {e}");
            0
        });
    }

    /// All records for a source message.
    pub fn get_all(&self, parent: &str) -> Vec<EmbedRecord> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT parent, reply, tweet_ids, created_at FROM embeds WHERE parent = ?1")
            .unwrap();

        let rows = stmt
            .query_map(params![parent], |row| {
                Ok(EmbedRecord {
                    parent: row.get(0)?,
                    reply: row.get(1)?,
                    tweet_ids: split_ids(&row.get::<_, String>(2)?),
                    created_at: row.get(3)?,
                })
            })
            .unwrap();

        rows.flatten().collect()
    }

    /// The record for a source message, if any.
    pub fn get_one(&self, parent: &str) -> Option<EmbedRecord> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT parent, reply, tweet_ids, created_at FROM embeds WHERE parent = ?1",
            params![parent],
            |row| {
                Ok(EmbedRecord {
                    parent: row.get(0)?,
                    reply: row.get(1)?,
                    tweet_ids: split_ids(&row.get::<_, String>(2)?),
                    created_at: row.get(3)?,
                })
            },
        )
        .ok()
    }

    /// Remove every record for a source message.
    pub fn remove(&self, parent: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM embeds WHERE parent = ?1", params![parent])
            .unwrap_or_else(|e| {
                warn!("Failed to remove embed records: {e}");
                0
            });
    }

    /// Total number of stored records.
    pub fn count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM embeds", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }
}

fn split_ids(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

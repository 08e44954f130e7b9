//! # Database Module
//!
//! SQLite-backed persistence for trainings, their audiences, and settings.
//! The store is the system of record for "did this training fire yet":
//! everything else (the dedup queue, armed timers) is rebuilt from it after
//! a restart.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::StoreError;

/// Audience sentinel meaning "mention the whole channel".
pub const EVERYONE: &str = "everyone";

/// A scheduled one-time training reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Training {
    pub id: i64,
    /// Destination channel id, owned and interpreted by the transport.
    pub channel: String,
    /// Absolute fire instant, normalized to UTC.
    pub date: DateTime<Utc>,
    /// Optional resource shared when the training fires.
    pub link: Option<String>,
    /// Flips false -> true exactly once, when dispatch succeeds.
    pub completed: bool,
}

/// Shared handle to the SQLite store.
///
/// Cheap to clone; all clones serialize access through one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and run schema migrations.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let conn = sqlite::open(path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trainings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                date TEXT NOT NULL,
                link TEXT,
                completed INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS trainings_users (
                training_id INTEGER NOT NULL,
                target TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            );",
        )?;

        debug!("Database ready at {path}");

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a training and its audience rows in one transaction.
    ///
    /// The audience may be empty (the dispatcher then falls back to
    /// mentioning everyone) or contain the [`EVERYONE`] sentinel.
    pub async fn create_training(
        &self,
        channel: &str,
        date: DateTime<Utc>,
        link: Option<&str>,
        audience: &[String],
    ) -> Result<Training, StoreError> {
        let conn = self.conn.lock().await;

        conn.execute("BEGIN IMMEDIATE TRANSACTION")?;
        let result = (|| -> Result<Training, StoreError> {
            let mut stmt =
                conn.prepare("INSERT INTO trainings (channel, date, link) VALUES (?, ?, ?)")?;
            stmt.bind((1, channel))?;
            stmt.bind((2, encode_instant(date).as_str()))?;
            stmt.bind((3, link))?;
            while stmt.next()? != State::Done {}

            let mut stmt = conn.prepare("SELECT last_insert_rowid()")?;
            stmt.next()?;
            let id = stmt.read::<i64, _>(0)?;

            for target in audience {
                let mut stmt = conn
                    .prepare("INSERT INTO trainings_users (training_id, target) VALUES (?, ?)")?;
                stmt.bind((1, id))?;
                stmt.bind((2, target.as_str()))?;
                while stmt.next()? != State::Done {}
            }

            Ok(Training {
                id,
                channel: channel.to_string(),
                date,
                link: link.map(str::to_string),
                completed: false,
            })
        })();

        match result {
            Ok(training) => {
                conn.execute("COMMIT")?;
                debug!("Created training {} in channel {channel}", training.id);
                Ok(training)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Load a single training by id.
    pub async fn get_training(&self, id: i64) -> Result<Option<Training>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, channel, date, link, completed FROM trainings WHERE id = ?")?;
        stmt.bind((1, id))?;

        if stmt.next()? == State::Row {
            Ok(Some(read_training(&stmt)?))
        } else {
            Ok(None)
        }
    }

    /// All incomplete trainings with a fire time at or before `cutoff`.
    ///
    /// Order is irrelevant; each returned training is armed independently.
    pub async fn list_incomplete_due_by(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Training>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, channel, date, link, completed FROM trainings
             WHERE completed = 0 AND date <= ?",
        )?;
        // Fixed-width RFC 3339 UTC strings compare lexicographically in
        // chronological order.
        stmt.bind((1, encode_instant(cutoff).as_str()))?;

        let mut trainings = Vec::new();
        while stmt.next()? == State::Row {
            trainings.push(read_training(&stmt)?);
        }
        Ok(trainings)
    }

    /// Audience rows for a training, in insertion order.
    pub async fn get_audience(&self, training_id: i64) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT target FROM trainings_users WHERE training_id = ?")?;
        stmt.bind((1, training_id))?;

        let mut targets = Vec::new();
        while stmt.next()? == State::Row {
            targets.push(stmt.read::<String, _>(0)?);
        }
        Ok(targets)
    }

    /// Mark a training as completed. Idempotent: marking an already
    /// completed training is a no-op, not an error.
    pub async fn mark_completed(&self, training_id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("UPDATE trainings SET completed = 1 WHERE id = ?")?;
        stmt.bind((1, training_id))?;
        while stmt.next()? != State::Done {}
        Ok(())
    }

    /// Stored timezone setting, falling back to UTC when absent.
    pub async fn get_timezone(&self) -> Result<String, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = 'timezone'")?;

        if stmt.next()? == State::Row {
            if let Some(value) = stmt.read::<Option<String>, _>(0)? {
                return Ok(value);
            }
        }
        Ok("UTC".to_string())
    }

    /// Upsert the timezone setting. Last write wins; the zone name is not
    /// validated here - the time resolver surfaces bad zones on use.
    pub async fn set_timezone(&self, zone: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO settings (key, value) VALUES ('timezone', ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )?;
        stmt.bind((1, zone))?;
        while stmt.next()? != State::Done {}
        Ok(())
    }
}

fn encode_instant(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn read_training(stmt: &Statement<'_>) -> Result<Training, StoreError> {
    let date_str = stmt.read::<String, _>(2)?;
    let date = DateTime::parse_from_rfc3339(&date_str)?.with_timezone(&Utc);

    Ok(Training {
        id: stmt.read::<i64, _>(0)?,
        channel: stmt.read::<String, _>(1)?,
        date,
        link: stmt.read::<Option<String>, _>(3)?,
        completed: stmt.read::<i64, _>(4)? != 0,
    })
}

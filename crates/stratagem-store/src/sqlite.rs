use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use tracing::debug;

use stratagem_core::types::{
    NotificationRecord, SessionState, SessionStatus, StrategyData, StrategyInsertData,
    TIMESTAMP_FORMAT,
};
use stratagem_core::ChatHistory;

use crate::error::{Result, StoreError};
use crate::store::{effective_sources, OutcomeStore};

/// SQLite-backed outcome store. Also the in-process test substrate —
/// `SqliteStore::open_in_memory()` gives a fully functional store with no
/// service dependency.
///
/// Strategy ids come from an AUTOINCREMENT column, which makes them
/// strictly increasing for every agent sharing the table.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

/// Create tables. Safe to call on every startup (idempotent).
fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS strategies (
            strategy_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id        TEXT NOT NULL,
            summarized_desc TEXT NOT NULL,
            full_desc       TEXT NOT NULL,
            parameters      TEXT,
            strategy_result TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_strategies_agent
            ON strategies(agent_id, strategy_id DESC);

        CREATE TABLE IF NOT EXISTS chat_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            timestamp   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_session
            ON chat_history(session_id, timestamp);

        CREATE TABLE IF NOT EXISTS notifications (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            source                  TEXT NOT NULL,
            short_desc              TEXT NOT NULL,
            long_desc               TEXT NOT NULL,
            notification_date       TEXT NOT NULL,
            relative_to_scraper_id  TEXT,
            bot_username            TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_notif_source
            ON notifications(source, notification_date DESC);

        CREATE TABLE IF NOT EXISTS agent_sessions (
            session_id  TEXT NOT NULL,
            agent_id    TEXT NOT NULL,
            started_at  TEXT NOT NULL,
            ended_at    TEXT,
            status      TEXT NOT NULL,
            cycle_count INTEGER NOT NULL DEFAULT 0,
            will_end_at TEXT,
            PRIMARY KEY (session_id, agent_id)
        );",
    )
}

fn row_to_strategy(row: &rusqlite::Row<'_>) -> rusqlite::Result<StrategyData> {
    let strategy_id: i64 = row.get(0)?;
    let parameters_json: Option<String> = row.get(4)?;
    let parameters: HashMap<String, serde_json::Value> = parameters_json
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    Ok(StrategyData {
        strategy_id: strategy_id.to_string(),
        agent_id: row.get(1)?,
        summarized_desc: row.get(2)?,
        full_desc: row.get(3)?,
        parameters,
        strategy_result: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionState> {
    let status_str: String = row.get(4)?;
    Ok(SessionState {
        session_id: row.get(0)?,
        agent_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        status: status_str.parse().unwrap_or(SessionStatus::Stopped),
        cycle_count: row.get::<_, i64>(5)? as u64,
        will_end_at: row.get(6)?,
    })
}

#[async_trait]
impl OutcomeStore for SqliteStore {
    async fn insert_strategy(&self, agent_id: &str, data: StrategyInsertData) -> Result<()> {
        let parameters = serde_json::to_string(&data.parameters)?;
        let now = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO strategies
             (agent_id, summarized_desc, full_desc, parameters, strategy_result, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                agent_id,
                data.summarized_desc,
                data.full_desc,
                parameters,
                data.strategy_result,
                now,
            ],
        )?;
        debug!(agent_id, "strategy inserted");
        Ok(())
    }

    async fn fetch_latest_strategy(&self, agent_id: &str) -> Result<Option<StrategyData>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT strategy_id, agent_id, summarized_desc, full_desc,
                    parameters, strategy_result, created_at
             FROM strategies
             WHERE agent_id = ?1
             ORDER BY strategy_id DESC
             LIMIT 1",
            rusqlite::params![agent_id],
            row_to_strategy,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn fetch_all_strategies(&self, agent_id: &str) -> Result<Vec<StrategyData>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT strategy_id, agent_id, summarized_desc, full_desc,
                    parameters, strategy_result, created_at
             FROM strategies
             WHERE agent_id = ?1
             ORDER BY strategy_id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![agent_id], row_to_strategy)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn insert_chat_history(
        &self,
        session_id: &str,
        history: &ChatHistory,
        base_timestamp: Option<&str>,
    ) -> Result<()> {
        let base = base_timestamp
            .and_then(|raw| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok())
            .unwrap_or_else(|| chrono::Utc::now().naive_utc());

        let db = self.db.lock().unwrap();
        for (i, message) in history.messages().iter().enumerate() {
            let timestamp = (base + chrono::Duration::seconds(i as i64))
                .format(TIMESTAMP_FORMAT)
                .to_string();
            db.execute(
                "INSERT INTO chat_history (session_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    session_id,
                    message.role.as_str(),
                    message.content,
                    timestamp
                ],
            )?;
        }
        Ok(())
    }

    async fn fetch_latest_notification_str(
        &self,
        sources: &[String],
        limit: usize,
    ) -> Result<String> {
        let sources = effective_sources(sources);

        let db = self.db.lock().unwrap();
        let mut seen: Vec<String> = Vec::new();
        for source in &sources {
            let mut stmt = db.prepare(
                "SELECT long_desc
                 FROM notifications
                 WHERE source = ?1
                 ORDER BY notification_date DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(rusqlite::params![source, limit as i64], |row| {
                row.get::<_, String>(0)
            })?;
            for desc in rows.filter_map(|r| r.ok()) {
                if !seen.contains(&desc) {
                    seen.push(desc);
                }
            }
        }
        Ok(seen.join("\n"))
    }

    async fn insert_notifications(&self, batch: &[NotificationRecord]) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut inserted = Vec::new();

        for record in batch {
            let duplicate: bool = db
                .query_row(
                    "SELECT 1 FROM notifications
                     WHERE (relative_to_scraper_id IS NOT NULL
                            AND relative_to_scraper_id = ?1)
                        OR long_desc = ?2
                     LIMIT 1",
                    rusqlite::params![record.relative_to_scraper_id, record.long_desc],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if duplicate {
                continue;
            }

            db.execute(
                "INSERT INTO notifications
                 (source, short_desc, long_desc, notification_date,
                  relative_to_scraper_id, bot_username)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.source,
                    record.short_desc,
                    record.long_desc,
                    record.notification_date,
                    record.relative_to_scraper_id,
                    record.bot_username,
                ],
            )?;
            inserted.push(db.last_insert_rowid().to_string());
        }

        Ok(inserted)
    }

    async fn create_session(&self, session: &SessionState) -> Result<()> {
        let now = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let db = self.db.lock().unwrap();

        // One running session per agent: stop any leftover before inserting.
        db.execute(
            "UPDATE agent_sessions
             SET status = 'stopped', ended_at = ?1
             WHERE agent_id = ?2 AND status = 'running'",
            rusqlite::params![now, session.agent_id],
        )?;

        db.execute(
            "INSERT OR REPLACE INTO agent_sessions
             (session_id, agent_id, started_at, ended_at, status, cycle_count, will_end_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                session.session_id,
                session.agent_id,
                session.started_at,
                session.ended_at,
                session.status.to_string(),
                session.cycle_count as i64,
                session.will_end_at,
            ],
        )?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionState>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT session_id, agent_id, started_at, ended_at, status,
                    cycle_count, will_end_at
             FROM agent_sessions
             WHERE session_id = ?1",
            rusqlite::params![session_id],
            row_to_session,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        agent_id: &str,
        status: SessionStatus,
    ) -> Result<()> {
        let now = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let db = self.db.lock().unwrap();

        if status == SessionStatus::Running {
            // Keep the single-running invariant when resuming a session.
            db.execute(
                "UPDATE agent_sessions
                 SET status = 'stopped', ended_at = ?1
                 WHERE agent_id = ?2 AND status = 'running' AND session_id != ?3",
                rusqlite::params![now, agent_id, session_id],
            )?;
        }

        let ended_at: Option<String> = match status {
            SessionStatus::Stopped => Some(now),
            SessionStatus::Running => None,
        };
        let changed = db.execute(
            "UPDATE agent_sessions
             SET status = ?1, ended_at = ?2
             WHERE session_id = ?3 AND agent_id = ?4",
            rusqlite::params![status.to_string(), ended_at, session_id, agent_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "session {} for agent {}",
                session_id, agent_id
            )));
        }
        Ok(())
    }

    async fn increment_cycle_count(&self, session_id: &str, agent_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE agent_sessions
             SET cycle_count = cycle_count + 1
             WHERE session_id = ?1 AND agent_id = ?2",
            rusqlite::params![session_id, agent_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "session {} for agent {}",
                session_id, agent_id
            )));
        }
        Ok(())
    }
}

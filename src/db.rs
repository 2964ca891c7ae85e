//! Journal storage
//!
//! SQLite stands in for the hosted vector store: entries keep an optional
//! embedding BLOB and similarity is computed in process. Single file, works
//! offline.

use crate::embeddings::{cosine_similarity, from_blob, to_blob};
use crate::types::JournalEntry;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r#"
-- Journal entries, one row per ingest (original or synthesized)
CREATE TABLE IF NOT EXISTS journal_entries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB,             -- L2-normalised f32 LE, NULL when embedding failed
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_journal_user_created ON journal_entries(user_id, created_at);
"#;

/// Open (or create) the journal database with schema
pub fn init_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;

    conn.execute_batch(SCHEMA)?;

    Ok(conn)
}

/// A stored entry scored against a query embedding
#[derive(Debug, Clone)]
pub struct EntryMatch {
    pub content: String,
    pub similarity: f32,
}

/// Thread-safe handle over the journal connection
pub struct JournalStore {
    conn: Mutex<Connection>,
}

impl JournalStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(init_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("journal store mutex poisoned: {}", e))?;
        f(&conn)
    }

    /// Store an entry, with or without an embedding
    pub fn insert_entry(
        &self,
        user_id: &str,
        content: &str,
        embedding: Option<&[f32]>,
    ) -> Result<JournalEntry> {
        let entry = JournalEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let blob = embedding.map(to_blob);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO journal_entries (id, user_id, content, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.id,
                    entry.user_id,
                    entry.content,
                    blob,
                    entry.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
                ],
            )?;
            Ok(())
        })?;

        Ok(entry)
    }

    /// Most recent entries for a user, newest first
    pub fn recent_entries(&self, user_id: &str, limit: usize) -> Result<Vec<JournalEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, content, created_at FROM journal_entries
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt.query_map(params![user_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, user_id, content, created_at) = row?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .with_context(|| format!("bad timestamp on entry {}", id))?
                    .with_timezone(&Utc);
                entries.push(JournalEntry {
                    id,
                    user_id,
                    content,
                    created_at,
                });
            }
            Ok(entries)
        })
    }

    /// Entries whose similarity to `query` is at least `threshold`, best first
    pub fn match_entries(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<EntryMatch>> {
        let candidates: Vec<(String, Vec<u8>)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT content, embedding FROM journal_entries
                 WHERE user_id = ?1 AND embedding IS NOT NULL",
            )?;
            let rows = stmt
                .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut matches: Vec<EntryMatch> = candidates
            .into_iter()
            .map(|(content, blob)| EntryMatch {
                similarity: cosine_similarity(query, &from_blob(&blob)),
                content,
            })
            .filter(|m| m.similarity >= threshold)
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    pub fn count_entries(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM journal_entries WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_db_creates_file() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("journal.db");
        let store = JournalStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.count_entries("u1").unwrap(), 0);
    }

    #[test]
    fn test_recent_entries_newest_first_and_scoped() {
        let store = JournalStore::open_in_memory().unwrap();
        store.insert_entry("u1", "first", None).unwrap();
        store.insert_entry("u1", "second", None).unwrap();
        store.insert_entry("u2", "other user", None).unwrap();
        store.insert_entry("u1", "third", None).unwrap();

        let recent = store.recent_entries("u1", 2).unwrap();
        let contents: Vec<_> = recent.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["third", "second"]);
        assert_eq!(store.count_entries("u2").unwrap(), 1);
    }

    #[test]
    fn test_match_entries_threshold_and_order() {
        let store = JournalStore::open_in_memory().unwrap();
        store.insert_entry("u1", "exact", Some(&[1.0, 0.0])).unwrap();
        store.insert_entry("u1", "close", Some(&[0.9, 0.1])).unwrap();
        store.insert_entry("u1", "orthogonal", Some(&[0.0, 1.0])).unwrap();
        store.insert_entry("u1", "no embedding", None).unwrap();
        store.insert_entry("u2", "someone else", Some(&[1.0, 0.0])).unwrap();

        let matches = store.match_entries("u1", &[1.0, 0.0], 0.7, 5).unwrap();
        let contents: Vec<_> = matches.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close"]);

        let top_one = store.match_entries("u1", &[1.0, 0.0], 0.7, 1).unwrap();
        assert_eq!(top_one.len(), 1);
    }
}

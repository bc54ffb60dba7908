//! SQLite-backed candidate storage.
//!
//! Candidates live in a single table keyed by `(relation_class, id)`; the
//! sentence words and entity mentions are stored as JSON text.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::error::Result;
use crate::types::{Candidate, CandidateClass, CandidateId, EntityMention};

use super::CandidateStore;

/// Stays well below SQLite's default host parameter limit (999).
const QUERY_CHUNK: usize = 500;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS candidate (
    relation_class TEXT NOT NULL,
    id INTEGER NOT NULL,
    words TEXT NOT NULL,
    entities TEXT NOT NULL,
    label REAL NOT NULL,
    PRIMARY KEY (relation_class, id)
)";

pub struct SqliteCandidateStore {
    conn: Connection,
}

impl SqliteCandidateStore {
    /// Open (and create if needed) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self { conn })
    }

    /// Insert or replace candidates in one transaction. Returns the row count.
    pub fn insert_all<'a>(
        &mut self,
        class: &CandidateClass,
        cands: impl IntoIterator<Item = &'a Candidate>,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO candidate (relation_class, id, words, entities, label)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for cand in cands {
                let words = serde_json::to_string(&cand.words)?;
                let entities = serde_json::to_string(&cand.entities)?;
                stmt.execute((
                    &class.relation_class,
                    cand.id,
                    words,
                    entities,
                    f64::from(cand.label),
                ))?;
                count += 1;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// Number of candidates stored for a class.
    pub fn count(&self, class: &CandidateClass) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM candidate WHERE relation_class = ?1",
            [&class.relation_class],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl CandidateStore for SqliteCandidateStore {
    fn fetch(&self, class: &CandidateClass, ids: &[CandidateId]) -> Result<Vec<Candidate>> {
        let mut cands = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(QUERY_CHUNK) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT id, words, entities, label FROM candidate
                 WHERE relation_class = ?1 AND id IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&sql)?;

            let mut params = Vec::with_capacity(chunk.len() + 1);
            params.push(Value::Text(class.relation_class.clone()));
            params.extend(chunk.iter().map(|&id| Value::Integer(id)));

            let rows = stmt.query_map(params_from_iter(params), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?;

            for row in rows {
                let (id, words, entities, label) = row?;
                let words: Vec<String> = serde_json::from_str(&words)?;
                let entities: Vec<EntityMention> = serde_json::from_str(&entities)?;
                cands.push(Candidate {
                    id,
                    words,
                    entities,
                    label: label as f32,
                });
            }
        }

        Ok(cands)
    }
}

//! SQLite-backed repository.
//! Glossary terms are keyed uniquely by normalized English term; TM rows are
//! scoped by (brand_id, target_language) and carry quality/usage/recency.
//! Connections come from a bounded r2d2 pool and are returned on drop.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{MatchType, NewTmEntry, Repository, TmEntry};
use crate::error::RepositoryError;
use crate::matching::Scope;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS glossary_terms (
        term_en TEXT PRIMARY KEY,
        term_target TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS translation_memory (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        brand_id TEXT NOT NULL,
        source_text TEXT NOT NULL,
        source_folded TEXT NOT NULL,
        target_text TEXT NOT NULL,
        source_language TEXT NOT NULL,
        target_language TEXT NOT NULL,
        project_id TEXT,
        asset_id TEXT,
        market TEXT,
        domain_context TEXT,
        match_type TEXT NOT NULL,
        quality_score INTEGER NOT NULL DEFAULT 0,
        confidence_level REAL,
        usage_count INTEGER NOT NULL DEFAULT 0,
        last_used INTEGER,
        cultural_adaptations TEXT,
        regulatory_notes TEXT,
        created_by TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_tm_scope
        ON translation_memory(brand_id, target_language);";

const TM_COLUMNS: &str = "id, brand_id, source_text, target_text, source_language,
    target_language, project_id, asset_id, market, domain_context, match_type,
    quality_score, confidence_level, usage_count, last_used, cultural_adaptations,
    regulatory_notes, created_by";

/// Applied once to every connection the pool opens.
#[derive(Debug)]
struct ConnectionSetup;

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionSetup {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL mode for concurrent readers alongside the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(())
    }
}

type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub struct SqliteRepository {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteRepository {
    /// Open (or create) the database at `db_path` and ensure the schema exists.
    /// At most `pool_size` connections are live at once; further callers wait
    /// up to `CHECKOUT_TIMEOUT` for one to be returned.
    pub fn open(db_path: &Path, pool_size: usize) -> Result<Self, RepositoryError> {
        let max_size = u32::try_from(pool_size.max(1)).unwrap_or(u32::MAX);
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .connection_customizer(Box::new(ConnectionSetup))
            .build(SqliteConnectionManager::file(db_path))?;
        pool.get()?.execute_batch(SCHEMA)?;
        info!(path = %db_path.display(), pool_size = max_size, "SQLite repository opened");
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConn, RepositoryError> {
        Ok(self.pool.get()?)
    }
}

impl Repository for SqliteRepository {
    fn glossary_lookup(&self, term_en: &str) -> Result<Option<String>, RepositoryError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT term_target FROM glossary_terms WHERE term_en = ?1",
                params![term_en],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found)
    }

    fn glossary_insert_or_ignore(
        &self,
        term_en: &str,
        term_target: &str,
    ) -> Result<bool, RepositoryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO glossary_terms (term_en, term_target) VALUES (?1, ?2)
             ON CONFLICT(term_en) DO NOTHING",
            params![term_en, term_target],
        )?;
        Ok(changed == 1)
    }

    fn glossary_len(&self) -> Result<usize, RepositoryError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM glossary_terms", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn tm_candidates(&self, scope: &Scope, token: &str) -> Result<Vec<TmEntry>, RepositoryError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TM_COLUMNS} FROM translation_memory
             WHERE target_language = ?1 AND brand_id = ?2 AND instr(source_folded, ?3) > 0"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![scope.target_language(), scope.brand_id().to_string(), token],
            tm_entry_from_row,
        )?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(token, candidates = entries.len(), "tm candidates scanned");
        Ok(entries)
    }

    fn tm_record_use(&self, id: i64, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE translation_memory
             SET usage_count = usage_count + 1, last_used = ?2
             WHERE id = ?1",
            params![id, at.timestamp_millis()],
        )?;
        Ok(())
    }

    fn insert_tm_entry(&self, entry: &NewTmEntry) -> Result<i64, RepositoryError> {
        let conn = self.conn()?;
        let cultural = entry
            .cultural_adaptations
            .as_ref()
            .map(|v| v.to_string());
        conn.execute(
            "INSERT INTO translation_memory
             (brand_id, source_text, source_folded, target_text, source_language,
              target_language, project_id, asset_id, market, domain_context, match_type,
              quality_score, confidence_level, usage_count, last_used,
              cultural_adaptations, regulatory_notes, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                entry.brand_id.to_string(),
                entry.source_text,
                entry.source_text.to_lowercase(),
                entry.target_text,
                entry.source_language,
                entry.normalized_target_language(),
                entry.project_id.map(|u| u.to_string()),
                entry.asset_id.map(|u| u.to_string()),
                entry.market,
                entry.domain_context,
                entry.match_type.as_str(),
                entry.quality_score,
                entry.confidence_level,
                entry.usage_count,
                entry.last_used.map(|t| t.timestamp_millis()),
                cultural,
                entry.regulatory_notes,
                entry.created_by.map(|u| u.to_string()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn tm_entry(&self, id: i64) -> Result<Option<TmEntry>, RepositoryError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {TM_COLUMNS} FROM translation_memory WHERE id = ?1");
        let entry = conn
            .query_row(&sql, params![id], tm_entry_from_row)
            .optional()?;
        Ok(entry)
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn tm_entry_from_row(row: &Row<'_>) -> rusqlite::Result<TmEntry> {
    let match_type: String = row.get(10)?;
    let match_type = match_type.parse::<MatchType>().map_err(|msg| {
        conversion_error(10, std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
    })?;
    let last_used: Option<i64> = row.get(14)?;
    let cultural: Option<String> = row.get(15)?;
    let cultural_adaptations = cultural
        .map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(15, e)))
        .transpose()?;

    Ok(TmEntry {
        id: row.get(0)?,
        brand_id: uuid_col(row, 1)?,
        source_text: row.get(2)?,
        target_text: row.get(3)?,
        source_language: row.get(4)?,
        target_language: row.get(5)?,
        project_id: opt_uuid_col(row, 6)?,
        asset_id: opt_uuid_col(row, 7)?,
        market: row.get(8)?,
        domain_context: row.get(9)?,
        match_type,
        quality_score: row.get(11)?,
        confidence_level: row.get(12)?,
        usage_count: row.get(13)?,
        last_used: last_used.and_then(DateTime::<Utc>::from_timestamp_millis),
        cultural_adaptations,
        regulatory_notes: row.get(16)?,
        created_by: opt_uuid_col(row, 17)?,
    })
}

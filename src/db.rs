use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row};

use crate::error::StoreError;

/// SQLite-backed store for leagues, seasons, teams, matches and strength
/// snapshots. Operations are split by entity across `catalog`, `matches` and
/// `snapshots`.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .context("enable WAL journal")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)
        .context("enable foreign keys")?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS leagues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sport TEXT NOT NULL,
            name TEXT NOT NULL,
            country TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (sport, name)
        );

        CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            base_coef_home_equal REAL NOT NULL,
            flip_coef REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (league_id, name)
        );

        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            aliases_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (season_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_teams_season ON teams(season_id);

        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id) ON DELETE CASCADE,
            tour_id TEXT NULL,
            date TEXT NOT NULL,
            market_type TEXT NOT NULL,
            home_team_id INTEGER NOT NULL REFERENCES teams(id),
            away_team_id INTEGER NOT NULL REFERENCES teams(id),
            k_home REAL NOT NULL,
            k_draw REAL NOT NULL,
            k_away REAL NOT NULL,
            total REAL NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (season_id, date, home_team_id, away_team_id, market_type)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_season_date ON matches(season_id, date);

        CREATE TABLE IF NOT EXISTS match_computed (
            match_id INTEGER PRIMARY KEY REFERENCES matches(id) ON DELETE CASCADE,
            base_prob_used REAL NOT NULL,
            p_home_implied REAL NOT NULL,
            p_draw_implied REAL NOT NULL,
            p_away_implied REAL NOT NULL,
            delta_home REAL NOT NULL,
            delta_away REAL NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS strength_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id) ON DELETE CASCADE,
            from_date TEXT NULL,
            to_date TEXT NULL,
            weight_mode TEXT NOT NULL,
            half_life_days REAL NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_season ON strength_snapshots(season_id);

        CREATE TABLE IF NOT EXISTS strength_values (
            snapshot_id INTEGER NOT NULL REFERENCES strength_snapshots(id) ON DELETE CASCADE,
            team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            strength REAL NOT NULL,
            PRIMARY KEY (snapshot_id, team_id)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Fixed-width UTC text so that SQL string comparison orders by time.
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw, idx)
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_ts(&s, idx)).transpose()
}

fn parse_ts(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// Turns a unique-constraint failure into [`StoreError::Conflict`], leaving
/// every other error as context-wrapped SQLite error.
pub(crate) fn map_write<T>(res: rusqlite::Result<T>, conflict: &str, what: &str) -> Result<T> {
    match res {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::Conflict(conflict.to_string()).into())
        }
        Err(err) => Err(anyhow::Error::new(err).context(what.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_as_text() {
        let a = Utc.with_ymd_and_hms(2024, 9, 1, 18, 30, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap();
        assert_eq!(ts_to_sql(a), "2024-09-01T18:30:00.000Z");
        assert!(ts_to_sql(a) < ts_to_sql(b));
    }

    #[test]
    fn schema_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        init_schema(&store.conn).unwrap();
        let tables: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'strength_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}

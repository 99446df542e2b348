//! Strength snapshots and odds quotes read from them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{load_season, load_season_teams};
use crate::db::{Store, opt_ts_col, ts_col, ts_to_sql};
use crate::error::StoreError;
use crate::inference::{OddsQuote, infer_odds};
use crate::model::{StrengthSnapshot, StrengthValue};
use crate::strength::{StrengthMatch, TeamId, Weighting, estimate_strengths};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub season_id: i64,
    /// Inclusive.
    pub from_date: Option<DateTime<Utc>>,
    /// Exclusive. Open-ended windows stop at the creation instant.
    pub to_date: Option<DateTime<Utc>>,
    pub half_life_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamQuote {
    pub snapshot_id: i64,
    pub team_id: TeamId,
    pub team_name: String,
    #[serde(flatten)]
    pub quote: OddsQuote,
}

impl Store {
    pub fn create_snapshot(&mut self, req: &SnapshotRequest) -> Result<StrengthSnapshot> {
        self.create_snapshot_at(req, Utc::now())
    }

    /// Same as [`Store::create_snapshot`] with an explicit evaluation
    /// instant, which drives both the open-ended window and the decay.
    pub fn create_snapshot_at(
        &mut self,
        req: &SnapshotRequest,
        now: DateTime<Utc>,
    ) -> Result<StrengthSnapshot> {
        let season = load_season(&self.conn, req.season_id)?;
        let upper = req.to_date.unwrap_or(now);
        if let Some(from) = req.from_date
            && from > upper
        {
            return Err(StoreError::Invalid(format!(
                "from_date {from} must not be after to_date {upper}"
            ))
            .into());
        }

        let teams = load_season_teams(&self.conn, season.id)?;
        let rows = load_window_rows(&self.conn, req, now)?;
        let team_ids: Vec<TeamId> = teams.iter().map(|t| t.id).collect();
        let weighting = Weighting::from_half_life(req.half_life_days);
        let fit = estimate_strengths(&team_ids, &rows, weighting, now)?;

        let tx = self.conn.transaction().context("begin snapshot insert")?;
        tx.execute(
            "INSERT INTO strength_snapshots (season_id, from_date, to_date, weight_mode, half_life_days, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                season.id,
                req.from_date.map(ts_to_sql),
                req.to_date.map(ts_to_sql),
                weighting.mode_str(),
                weighting.half_life_days(),
                ts_to_sql(now)
            ],
        )
        .context("insert snapshot")?;
        let snapshot_id = tx.last_insert_rowid();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO strength_values (snapshot_id, team_id, strength) VALUES (?1, ?2, ?3)",
                )
                .context("prepare strength value insert")?;
            for (team_id, strength) in &fit.ratings {
                stmt.execute(params![snapshot_id, team_id, strength])
                    .context("insert strength value")?;
            }
        }
        tx.commit().context("commit snapshot")?;

        info!(
            snapshot_id,
            season_id = season.id,
            teams = team_ids.len(),
            matches = fit.rows_used,
            mode = weighting.mode_str(),
            "strength snapshot created"
        );
        self.get_snapshot(snapshot_id)
    }

    pub fn get_snapshot(&self, id: i64) -> Result<StrengthSnapshot> {
        let mut snapshot = self
            .conn
            .query_row(
                "SELECT id, season_id, from_date, to_date, weight_mode, half_life_days, created_at
                 FROM strength_snapshots WHERE id = ?1",
                params![id],
                snapshot_from_row,
            )
            .optional()
            .context("query snapshot")?
            .ok_or_else(|| anyhow::Error::from(StoreError::not_found("snapshot", id)))?;
        snapshot.values = load_values(&self.conn, id)?;
        Ok(snapshot)
    }

    /// Newest first.
    pub fn list_snapshots(&self, season_id: i64) -> Result<Vec<StrengthSnapshot>> {
        load_season(&self.conn, season_id)?;
        let ids = {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT id FROM strength_snapshots WHERE season_id = ?1
                     ORDER BY created_at DESC, id DESC",
                )
                .context("prepare snapshots query")?;
            let rows = stmt
                .query_map(params![season_id], |row| row.get::<_, i64>(0))
                .context("query snapshots")?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.context("decode snapshot id")?);
            }
            ids
        };
        ids.into_iter().map(|id| self.get_snapshot(id)).collect()
    }

    /// Synthetic odds for a pairing, using the snapshot's ratings and the
    /// season's current constants.
    pub fn quote(
        &self,
        snapshot_id: i64,
        home_team_id: TeamId,
        away_team_id: TeamId,
    ) -> Result<TeamQuote> {
        if home_team_id == away_team_id {
            return Err(
                StoreError::Invalid("home and away team must be different".to_string()).into(),
            );
        }
        let snapshot = self.get_snapshot(snapshot_id)?;
        let season = load_season(&self.conn, snapshot.season_id)?;
        let home = snapshot
            .value_for(home_team_id)
            .ok_or_else(|| StoreError::not_found("team in snapshot", home_team_id))?;
        let away = snapshot
            .value_for(away_team_id)
            .ok_or_else(|| StoreError::not_found("team in snapshot", away_team_id))?;

        let quote = infer_odds(home.strength, away.strength, &season.calibration())?;
        let side = if quote.is_home_team { home } else { away };
        Ok(TeamQuote {
            snapshot_id,
            team_id: side.team_id,
            team_name: side.team_name.clone(),
            quote,
        })
    }
}

fn load_window_rows(
    conn: &Connection,
    req: &SnapshotRequest,
    now: DateTime<Utc>,
) -> Result<Vec<StrengthMatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT m.date, m.home_team_id, m.away_team_id, c.delta_home
            FROM matches m
            JOIN match_computed c ON c.match_id = m.id
            WHERE m.season_id = ?1
              AND (?2 IS NULL OR m.date >= ?2)
              AND ((?3 IS NOT NULL AND m.date < ?3) OR (?3 IS NULL AND m.date <= ?4))
            ORDER BY m.date ASC, m.id ASC
            "#,
        )
        .context("prepare snapshot window query")?;
    let rows = stmt
        .query_map(
            params![
                req.season_id,
                req.from_date.map(ts_to_sql),
                req.to_date.map(ts_to_sql),
                ts_to_sql(now)
            ],
            |row| {
                Ok(StrengthMatch {
                    date: ts_col(row, 0)?,
                    home_team_id: row.get(1)?,
                    away_team_id: row.get(2)?,
                    delta_home: row.get(3)?,
                })
            },
        )
        .context("query snapshot window")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode window row")?);
    }
    Ok(out)
}

/// Strongest first.
fn load_values(conn: &Connection, snapshot_id: i64) -> Result<Vec<StrengthValue>> {
    let mut stmt = conn
        .prepare(
            "SELECT v.team_id, t.name, v.strength
             FROM strength_values v
             JOIN teams t ON t.id = v.team_id
             WHERE v.snapshot_id = ?1
             ORDER BY v.strength DESC, t.name ASC",
        )
        .context("prepare strength values query")?;
    let rows = stmt
        .query_map(params![snapshot_id], |row| {
            Ok(StrengthValue {
                team_id: row.get(0)?,
                team_name: row.get(1)?,
                strength: row.get(2)?,
            })
        })
        .context("query strength values")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode strength value")?);
    }
    Ok(out)
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<StrengthSnapshot> {
    let mode: String = row.get(4)?;
    let half_life: Option<f64> = row.get(5)?;
    let weighting = match (mode.as_str(), half_life) {
        ("none", _) => Weighting::None,
        ("exp_decay", Some(half_life_days)) => Weighting::ExpDecay { half_life_days },
        _ => {
            return Err(rusqlite::Error::InvalidColumnType(
                4,
                "weight_mode".to_string(),
                Type::Text,
            ));
        }
    };
    Ok(StrengthSnapshot {
        id: row.get(0)?,
        season_id: row.get(1)?,
        from_date: opt_ts_col(row, 2)?,
        to_date: opt_ts_col(row, 3)?,
        weighting,
        created_at: ts_col(row, 6)?,
        values: Vec::new(),
    })
}

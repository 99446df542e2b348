//! Match writes. Every write recomputes the edge and stores it together with
//! the match row in one transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{load_season, load_team};
use crate::config::MAX_PAGE_SIZE;
use crate::db::{Store, map_write, ts_col, ts_to_sql};
use crate::edge::{Calibration, MatchComputed, MatchOdds, compute_edge};
use crate::error::{EngineError, StoreError};
use crate::model::{MarketType, Match, MatchesPage, Season};
use crate::strength::TeamId;

const DEFAULT_PAGE_SIZE: usize = 20;

const MATCH_SELECT: &str = r#"
    SELECT
        m.id, m.season_id, m.tour_id, m.date, m.market_type,
        m.home_team_id, m.away_team_id, ht.name, awt.name,
        m.k_home, m.k_draw, m.k_away, m.total, m.created_at, m.updated_at,
        c.base_prob_used, c.p_home_implied, c.p_draw_implied, c.p_away_implied,
        c.delta_home, c.delta_away
    FROM matches m
    JOIN teams ht ON ht.id = m.home_team_id
    JOIN teams awt ON awt.id = m.away_team_id
    LEFT JOIN match_computed c ON c.match_id = m.id
"#;

const DUPLICATE_MATCH: &str = "match already exists (same season/date/teams/market type)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub season_id: i64,
    #[serde(default)]
    pub tour_id: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub market_type: MarketType,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub k_home: f64,
    pub k_draw: f64,
    pub k_away: f64,
    #[serde(default)]
    pub total: Option<f64>,
}

/// Partial update. `None` keeps the stored value; the nested options of
/// `tour_id` and `total` allow clearing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPatch {
    pub tour_id: Option<Option<String>>,
    pub date: Option<DateTime<Utc>>,
    pub home_team_id: Option<TeamId>,
    pub away_team_id: Option<TeamId>,
    pub k_home: Option<f64>,
    pub k_draw: Option<f64>,
    pub k_away: Option<f64>,
    pub total: Option<Option<f64>>,
}

impl Store {
    pub fn create_match(&mut self, input: &NewMatch) -> Result<Match> {
        let tx = self.conn.transaction().context("begin match insert")?;
        let id = insert_match(&tx, input)?;
        tx.commit().context("commit match insert")?;
        self.get_match(id)
    }

    pub fn update_match(&mut self, id: i64, patch: &MatchPatch) -> Result<Match> {
        let existing = self.get_match(id)?;
        let season = load_season(&self.conn, existing.season_id)?;

        let home_team_id = patch.home_team_id.unwrap_or(existing.home_team_id);
        let away_team_id = patch.away_team_id.unwrap_or(existing.away_team_id);
        check_teams(&self.conn, &season, home_team_id, away_team_id)?;

        let total = patch.total.unwrap_or(existing.total);
        check_total(total)?;
        let odds = MatchOdds::new(
            patch.k_home.unwrap_or(existing.k_home),
            patch.k_draw.unwrap_or(existing.k_draw),
            patch.k_away.unwrap_or(existing.k_away),
        )?;
        let computed = compute_edge(&odds, &season.calibration())?;
        let tour_id = patch.tour_id.clone().unwrap_or(existing.tour_id);
        let date = patch.date.unwrap_or(existing.date);

        let now = ts_to_sql(Utc::now());
        let tx = self.conn.transaction().context("begin match update")?;
        map_write(
            tx.execute(
                "UPDATE matches SET
                    tour_id = ?1, date = ?2, home_team_id = ?3, away_team_id = ?4,
                    k_home = ?5, k_draw = ?6, k_away = ?7, total = ?8, updated_at = ?9
                 WHERE id = ?10",
                params![
                    tour_id,
                    ts_to_sql(date),
                    home_team_id,
                    away_team_id,
                    odds.k_home,
                    odds.k_draw,
                    odds.k_away,
                    total,
                    now,
                    id
                ],
            ),
            DUPLICATE_MATCH,
            "update match",
        )?;
        upsert_computed(&tx, id, &computed, &now)?;
        tx.commit().context("commit match update")?;
        self.get_match(id)
    }

    pub fn get_match(&self, id: i64) -> Result<Match> {
        self.conn
            .query_row(&format!("{MATCH_SELECT} WHERE m.id = ?1"), params![id], match_from_row)
            .optional()
            .context("query match")?
            .ok_or_else(|| StoreError::not_found("match", id).into())
    }

    /// Newest first.
    pub fn list_matches(&self, season_id: i64) -> Result<Vec<Match>> {
        load_season(&self.conn, season_id)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{MATCH_SELECT} WHERE m.season_id = ?1 ORDER BY m.date DESC, m.id DESC"
            ))
            .context("prepare matches query")?;
        let rows = stmt
            .query_map(params![season_id], match_from_row)
            .context("query matches")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode match row")?);
        }
        Ok(out)
    }

    /// Page numbers start at 1. Out-of-range arguments are clamped rather
    /// than rejected: page 0 reads page 1, a zero page size falls back to 20
    /// and anything above 100 is capped.
    pub fn list_matches_page(
        &self,
        season_id: i64,
        page: usize,
        page_size: usize,
    ) -> Result<MatchesPage> {
        load_season(&self.conn, season_id)?;
        let page = page.max(1);
        let page_size = match page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let offset = (page - 1) * page_size;

        let total_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM matches WHERE season_id = ?1",
                params![season_id],
                |row| row.get(0),
            )
            .context("count matches")?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "{MATCH_SELECT} WHERE m.season_id = ?1 ORDER BY m.date DESC, m.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))
            .context("prepare matches page query")?;
        let rows = stmt
            .query_map(
                params![season_id, page_size as i64, offset as i64],
                match_from_row,
            )
            .context("query matches page")?;
        let mut matches = Vec::new();
        for row in rows {
            matches.push(row.context("decode match row")?);
        }

        let total_count = total_count as usize;
        Ok(MatchesPage {
            matches,
            total_count,
            page,
            page_size,
            total_pages: total_count.div_ceil(page_size),
        })
    }

    pub fn delete_match(&mut self, id: i64) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM matches WHERE id = ?1", params![id])
            .context("delete match")?;
        if n == 0 {
            return Err(StoreError::not_found("match", id).into());
        }
        Ok(())
    }
}

/// Validates the match, computes its edge and writes both rows. Callers own
/// the transaction.
pub(crate) fn insert_match(conn: &Connection, input: &NewMatch) -> Result<i64> {
    let season = load_season(conn, input.season_id)?;
    check_teams(conn, &season, input.home_team_id, input.away_team_id)?;
    check_total(input.total)?;
    let odds = MatchOdds::new(input.k_home, input.k_draw, input.k_away)?;
    let computed = compute_edge(&odds, &season.calibration())?;

    let now = ts_to_sql(Utc::now());
    map_write(
        conn.execute(
            "INSERT INTO matches (
                season_id, tour_id, date, market_type, home_team_id, away_team_id,
                k_home, k_draw, k_away, total, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                season.id,
                input.tour_id,
                ts_to_sql(input.date),
                input.market_type.as_str(),
                input.home_team_id,
                input.away_team_id,
                odds.k_home,
                odds.k_draw,
                odds.k_away,
                input.total,
                now
            ],
        ),
        DUPLICATE_MATCH,
        "insert match",
    )?;
    let id = conn.last_insert_rowid();
    upsert_computed(conn, id, &computed, &now)?;

    debug!(
        match_id = id,
        season_id = season.id,
        delta_home = computed.delta_home,
        "match created"
    );
    Ok(id)
}

/// Rewrites the computed record of every match in the season under `cal`.
/// Runs inside the caller's transaction; any odds the new constants cannot
/// handle abort the whole batch.
pub(crate) fn recompute_season_computed(
    conn: &Connection,
    season_id: i64,
    cal: &Calibration,
) -> Result<usize> {
    let mut stmt = conn
        .prepare("SELECT id, k_home, k_draw, k_away FROM matches WHERE season_id = ?1")
        .context("prepare season odds query")?;
    let rows = stmt
        .query_map(params![season_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                MatchOdds {
                    k_home: row.get(1)?,
                    k_draw: row.get(2)?,
                    k_away: row.get(3)?,
                },
            ))
        })
        .context("query season odds")?;
    let mut odds = Vec::new();
    for row in rows {
        odds.push(row.context("decode season odds row")?);
    }

    let computed = odds
        .par_iter()
        .map(|(id, o)| compute_edge(o, cal).map(|c| (*id, c)))
        .collect::<Result<Vec<_>, EngineError>>()?;

    let now = ts_to_sql(Utc::now());
    for (id, c) in &computed {
        upsert_computed(conn, *id, c, &now)?;
    }
    info!(season_id, matches = computed.len(), "recomputed match edges");
    Ok(computed.len())
}

fn upsert_computed(conn: &Connection, match_id: i64, c: &MatchComputed, now: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO match_computed (
            match_id, base_prob_used, p_home_implied, p_draw_implied, p_away_implied,
            delta_home, delta_away, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(match_id) DO UPDATE SET
            base_prob_used = excluded.base_prob_used,
            p_home_implied = excluded.p_home_implied,
            p_draw_implied = excluded.p_draw_implied,
            p_away_implied = excluded.p_away_implied,
            delta_home = excluded.delta_home,
            delta_away = excluded.delta_away,
            updated_at = excluded.updated_at",
        params![
            match_id,
            c.base_prob_used,
            c.p_home_implied,
            c.p_draw_implied,
            c.p_away_implied,
            c.delta_home,
            c.delta_away,
            now
        ],
    )
    .context("upsert match computed")?;
    Ok(())
}

fn check_teams(conn: &Connection, season: &Season, home: TeamId, away: TeamId) -> Result<()> {
    if home == away {
        return Err(
            StoreError::Invalid("home and away team must be different".to_string()).into(),
        );
    }
    let home_team = load_team(conn, home)?;
    let away_team = load_team(conn, away)?;
    if home_team.season_id != season.id || away_team.season_id != season.id {
        return Err(StoreError::Invalid(
            "teams must belong to the same season as the match".to_string(),
        )
        .into());
    }
    Ok(())
}

fn check_total(total: Option<f64>) -> Result<()> {
    match total {
        Some(t) if !t.is_finite() || t < 0.0 => {
            Err(StoreError::Invalid(format!("total must be a finite non-negative line, got {t}")).into())
        }
        _ => Ok(()),
    }
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    let market_raw: String = row.get(4)?;
    let market_type = MarketType::parse(&market_raw)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(4, "market_type".to_string(), Type::Text))?;

    let computed = match row.get::<_, Option<f64>>(15)? {
        Some(base_prob_used) => Some(MatchComputed {
            base_prob_used,
            p_home_implied: row.get(16)?,
            p_draw_implied: row.get(17)?,
            p_away_implied: row.get(18)?,
            delta_home: row.get(19)?,
            delta_away: row.get(20)?,
        }),
        None => None,
    };

    Ok(Match {
        id: row.get(0)?,
        season_id: row.get(1)?,
        tour_id: row.get(2)?,
        date: ts_col(row, 3)?,
        market_type,
        home_team_id: row.get(5)?,
        away_team_id: row.get(6)?,
        home_team_name: row.get(7)?,
        away_team_name: row.get(8)?,
        k_home: row.get(9)?,
        k_draw: row.get(10)?,
        k_away: row.get(11)?,
        total: row.get(12)?,
        computed,
        created_at: ts_col(row, 13)?,
        updated_at: ts_col(row, 14)?,
    })
}

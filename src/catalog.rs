//! Leagues, seasons and teams.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{Store, map_write, ts_col, ts_to_sql};
use crate::edge::Calibration;
use crate::error::StoreError;
use crate::model::{League, Season, SportKey, Team, clean_aliases, clean_text};

const LEAGUE_COLUMNS: &str = "id, sport, name, country, created_at, updated_at";
const SEASON_COLUMNS: &str =
    "id, league_id, name, base_coef_home_equal, flip_coef, created_at, updated_at";
const TEAM_COLUMNS: &str = "id, season_id, name, aliases_json, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSeason {
    pub league_id: i64,
    pub name: String,
    pub base_coef_home_equal: f64,
    pub flip_coef: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonPatch {
    pub name: Option<String>,
    pub base_coef_home_equal: Option<f64>,
    pub flip_coef: Option<f64>,
}

impl SeasonPatch {
    fn touches_calibration(&self) -> bool {
        self.base_coef_home_equal.is_some() || self.flip_coef.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTeam {
    pub season_id: i64,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamPatch {
    pub name: Option<String>,
    pub aliases: Option<Vec<String>>,
}

impl Store {
    pub fn create_league(
        &mut self,
        sport: SportKey,
        name: &str,
        country: Option<&str>,
    ) -> Result<League> {
        let name = clean_text(name);
        if name.is_empty() {
            return Err(StoreError::Invalid("league name must not be empty".to_string()).into());
        }
        let country = country.map(clean_text).filter(|c| !c.is_empty());
        let now = ts_to_sql(Utc::now());
        map_write(
            self.conn.execute(
                "INSERT INTO leagues (sport, name, country, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![sport.as_str(), name, country, now],
            ),
            "league with this name already exists for this sport",
            "insert league",
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_league(id)
    }

    pub fn get_league(&self, id: i64) -> Result<League> {
        self.conn
            .query_row(
                &format!("SELECT {LEAGUE_COLUMNS} FROM leagues WHERE id = ?1"),
                params![id],
                league_from_row,
            )
            .optional()
            .context("query league")?
            .ok_or_else(|| StoreError::not_found("league", id).into())
    }

    pub fn list_leagues(&self) -> Result<Vec<League>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {LEAGUE_COLUMNS} FROM leagues ORDER BY sport ASC, name ASC"
            ))
            .context("prepare leagues query")?;
        let rows = stmt
            .query_map([], league_from_row)
            .context("query leagues")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode league row")?);
        }
        Ok(out)
    }

    pub fn delete_league(&mut self, id: i64) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM leagues WHERE id = ?1", params![id])
            .context("delete league")?;
        if n == 0 {
            return Err(StoreError::not_found("league", id).into());
        }
        Ok(())
    }

    pub fn create_season(&mut self, input: &NewSeason) -> Result<Season> {
        let id = insert_season(&self.conn, input)?;
        self.get_season(id)
    }

    pub fn get_season(&self, id: i64) -> Result<Season> {
        load_season(&self.conn, id)
    }

    /// Newest first.
    pub fn list_seasons(&self, league_id: i64) -> Result<Vec<Season>> {
        self.get_league(league_id)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SEASON_COLUMNS} FROM seasons WHERE league_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))
            .context("prepare seasons query")?;
        let rows = stmt
            .query_map(params![league_id], season_from_row)
            .context("query seasons")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode season row")?);
        }
        Ok(out)
    }

    /// Applies the patch. When a calibration constant changes, every match
    /// of the season gets its computed record rewritten in the same
    /// transaction.
    pub fn update_season(&mut self, id: i64, patch: &SeasonPatch) -> Result<Season> {
        let existing = self.get_season(id)?;
        let name = match &patch.name {
            Some(raw) => {
                let name = clean_text(raw);
                if name.is_empty() {
                    return Err(
                        StoreError::Invalid("season name must not be empty".to_string()).into(),
                    );
                }
                name
            }
            None => existing.name.clone(),
        };
        let cal = Calibration::new(
            patch
                .base_coef_home_equal
                .unwrap_or(existing.base_coef_home_equal),
            patch.flip_coef.unwrap_or(existing.flip_coef),
        )?;

        let tx = self.conn.transaction().context("begin season update")?;
        map_write(
            tx.execute(
                "UPDATE seasons
                 SET name = ?1, base_coef_home_equal = ?2, flip_coef = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    name,
                    cal.base_coef_home_equal,
                    cal.flip_coef,
                    ts_to_sql(Utc::now()),
                    id
                ],
            ),
            "season with this name already exists in this league",
            "update season",
        )?;
        if patch.touches_calibration() && cal != existing.calibration() {
            let recomputed = crate::matches::recompute_season_computed(&tx, id, &cal)?;
            info!(season_id = id, recomputed, "season calibration changed");
        }
        tx.commit().context("commit season update")?;
        self.get_season(id)
    }

    pub fn delete_season(&mut self, id: i64) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM seasons WHERE id = ?1", params![id])
            .context("delete season")?;
        if n == 0 {
            return Err(StoreError::not_found("season", id).into());
        }
        Ok(())
    }

    pub fn create_team(&mut self, input: &NewTeam) -> Result<Team> {
        let id = insert_team(&self.conn, input)?;
        self.get_team(id)
    }

    pub fn get_team(&self, id: i64) -> Result<Team> {
        load_team(&self.conn, id)
    }

    /// Ordered by name.
    pub fn list_teams(&self, season_id: i64) -> Result<Vec<Team>> {
        self.get_season(season_id)?;
        load_season_teams(&self.conn, season_id)
    }

    /// Looks a team up by name or alias, ignoring case and extra whitespace.
    pub fn find_team(&self, season_id: i64, query: &str) -> Result<Option<Team>> {
        if clean_text(query).is_empty() {
            return Ok(None);
        }
        let teams = self.list_teams(season_id)?;
        Ok(teams.into_iter().find(|t| t.answers_to(query)))
    }

    /// Team referenced by id or by name/alias. An integer query is taken as an
    /// id only when that id belongs to the season; otherwise it is looked up
    /// as a name, so numeric team names still resolve.
    pub fn resolve_team(&self, season_id: i64, query: &str) -> Result<Option<Team>> {
        let teams = self.list_teams(season_id)?;
        if let Ok(id) = clean_text(query).parse::<i64>()
            && let Some(team) = teams.iter().find(|t| t.id == id)
        {
            return Ok(Some(team.clone()));
        }
        if clean_text(query).is_empty() {
            return Ok(None);
        }
        Ok(teams.into_iter().find(|t| t.answers_to(query)))
    }

    pub fn update_team(&mut self, id: i64, patch: &TeamPatch) -> Result<Team> {
        let existing = self.get_team(id)?;
        let name = match &patch.name {
            Some(raw) => {
                let name = clean_text(raw);
                if name.is_empty() {
                    return Err(
                        StoreError::Invalid("team name must not be empty".to_string()).into(),
                    );
                }
                name
            }
            None => existing.name.clone(),
        };
        let aliases = clean_aliases(&name, patch.aliases.as_ref().unwrap_or(&existing.aliases));
        let aliases_json = serde_json::to_string(&aliases).context("serialize aliases")?;
        map_write(
            self.conn.execute(
                "UPDATE teams SET name = ?1, aliases_json = ?2, updated_at = ?3 WHERE id = ?4",
                params![name, aliases_json, ts_to_sql(Utc::now()), id],
            ),
            "team with this name already exists in this season",
            "update team",
        )?;
        self.get_team(id)
    }

    /// Refuses to delete a team that still has matches.
    pub fn delete_team(&mut self, id: i64) -> Result<()> {
        self.get_team(id)?;
        let referenced: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM matches WHERE home_team_id = ?1 OR away_team_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("count team matches")?;
        if referenced > 0 {
            return Err(StoreError::Conflict(format!(
                "team {id} is referenced by {referenced} match(es)"
            ))
            .into());
        }
        self.conn
            .execute("DELETE FROM teams WHERE id = ?1", params![id])
            .context("delete team")?;
        Ok(())
    }
}

/// Validates and inserts a season; works on a plain connection or inside a
/// caller's transaction.
pub(crate) fn insert_season(conn: &Connection, input: &NewSeason) -> Result<i64> {
    let league_exists = conn
        .query_row(
            "SELECT 1 FROM leagues WHERE id = ?1",
            params![input.league_id],
            |_| Ok(()),
        )
        .optional()
        .context("query league")?;
    if league_exists.is_none() {
        return Err(StoreError::not_found("league", input.league_id).into());
    }
    let name = clean_text(&input.name);
    if name.is_empty() {
        return Err(StoreError::Invalid("season name must not be empty".to_string()).into());
    }
    Calibration::new(input.base_coef_home_equal, input.flip_coef)?;

    let now = ts_to_sql(Utc::now());
    map_write(
        conn.execute(
            "INSERT INTO seasons (league_id, name, base_coef_home_equal, flip_coef, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                input.league_id,
                name,
                input.base_coef_home_equal,
                input.flip_coef,
                now
            ],
        ),
        "season with this name already exists in this league",
        "insert season",
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_team(conn: &Connection, input: &NewTeam) -> Result<i64> {
    load_season(conn, input.season_id)?;
    let name = clean_text(&input.name);
    if name.is_empty() {
        return Err(StoreError::Invalid("team name must not be empty".to_string()).into());
    }
    let aliases = clean_aliases(&name, &input.aliases);
    let aliases_json = serde_json::to_string(&aliases).context("serialize aliases")?;
    let now = ts_to_sql(Utc::now());
    map_write(
        conn.execute(
            "INSERT INTO teams (season_id, name, aliases_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![input.season_id, name, aliases_json, now],
        ),
        "team with this name already exists in this season",
        "insert team",
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn load_season(conn: &Connection, id: i64) -> Result<Season> {
    conn.query_row(
        &format!("SELECT {SEASON_COLUMNS} FROM seasons WHERE id = ?1"),
        params![id],
        season_from_row,
    )
    .optional()
    .context("query season")?
    .ok_or_else(|| StoreError::not_found("season", id).into())
}

pub(crate) fn load_team(conn: &Connection, id: i64) -> Result<Team> {
    conn.query_row(
        &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
        params![id],
        team_from_row,
    )
    .optional()
    .context("query team")?
    .ok_or_else(|| StoreError::not_found("team", id).into())
}

pub(crate) fn load_season_teams(conn: &Connection, season_id: i64) -> Result<Vec<Team>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE season_id = ?1 ORDER BY name ASC, id ASC"
        ))
        .context("prepare teams query")?;
    let rows = stmt
        .query_map(params![season_id], team_from_row)
        .context("query teams")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team row")?);
    }
    Ok(out)
}

fn league_from_row(row: &Row<'_>) -> rusqlite::Result<League> {
    let sport_raw: String = row.get(1)?;
    let sport = SportKey::parse(&sport_raw)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(1, "sport".to_string(), Type::Text))?;
    Ok(League {
        id: row.get(0)?,
        sport,
        name: row.get(2)?,
        country: row.get(3)?,
        created_at: ts_col(row, 4)?,
        updated_at: ts_col(row, 5)?,
    })
}

fn season_from_row(row: &Row<'_>) -> rusqlite::Result<Season> {
    Ok(Season {
        id: row.get(0)?,
        league_id: row.get(1)?,
        name: row.get(2)?,
        base_coef_home_equal: row.get(3)?,
        flip_coef: row.get(4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    let aliases_raw: String = row.get(3)?;
    let aliases: Vec<String> = serde_json::from_str(&aliases_raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(err)))?;
    Ok(Team {
        id: row.get(0)?,
        season_id: row.get(1)?,
        name: row.get(2)?,
        aliases,
        created_at: ts_col(row, 4)?,
        updated_at: ts_col(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Store, Season) {
        let mut store = Store::open_in_memory().unwrap();
        let league = store
            .create_league(SportKey::Football, " Premier  League ", Some("England"))
            .unwrap();
        let season = store
            .create_season(&NewSeason {
                league_id: league.id,
                name: "2024/25".to_string(),
                base_coef_home_equal: 2.4,
                flip_coef: 1.1,
            })
            .unwrap();
        (store, season)
    }

    #[test]
    fn league_name_is_cleaned_and_unique() {
        let (mut store, season) = seeded();
        let league = store.get_league(season.league_id).unwrap();
        assert_eq!(league.name, "Premier League");
        let err = store
            .create_league(SportKey::Football, "Premier League", None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Conflict(_))
        ));
        // Same name under another sport is fine.
        store
            .create_league(SportKey::Hockey, "Premier League", None)
            .unwrap();
    }

    #[test]
    fn season_rejects_bad_calibration() {
        let (mut store, season) = seeded();
        let err = store
            .create_season(&NewSeason {
                league_id: season.league_id,
                name: "bad".to_string(),
                base_coef_home_equal: 0.9,
                flip_coef: 1.0,
            })
            .unwrap_err();
        assert!(err.downcast_ref::<crate::error::EngineError>().is_some());
    }

    #[test]
    fn team_aliases_are_cleaned_and_searchable() {
        let (mut store, season) = seeded();
        let team = store
            .create_team(&NewTeam {
                season_id: season.id,
                name: "Tottenham  Hotspur".to_string(),
                aliases: vec![
                    "Spurs".to_string(),
                    "spurs".to_string(),
                    "tottenham hotspur".to_string(),
                    " ".to_string(),
                ],
            })
            .unwrap();
        assert_eq!(team.name, "Tottenham Hotspur");
        assert_eq!(team.aliases, vec!["Spurs".to_string()]);

        let found = store.find_team(season.id, "SPURS").unwrap().unwrap();
        assert_eq!(found.id, team.id);
        assert!(store.find_team(season.id, "Arsenal").unwrap().is_none());

        let renamed = store
            .update_team(
                team.id,
                &TeamPatch {
                    name: Some("Spurs".to_string()),
                    aliases: None,
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "Spurs");
        assert!(renamed.aliases.is_empty());
    }

    #[test]
    fn missing_rows_are_not_found() {
        let (store, _) = seeded();
        let err = store.get_team(999).unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::not_found("team", 999))
        );
    }
}

//! JSON description of a season: constants, teams and priced matches.
//!
//! Used both to seed the store and to run the whole engine in memory
//! (edges, strengths, quotes) without touching SQLite.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{NewSeason, NewTeam, insert_season, insert_team};
use crate::db::Store;
use crate::edge::{Calibration, MatchComputed, MatchOdds, compute_edge};
use crate::inference::{OddsQuote, infer_odds};
use crate::matches::{NewMatch, insert_match};
use crate::model::{Season, clean_aliases, clean_text};
use crate::strength::{StrengthMatch, TeamId, Weighting, estimate_strengths};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonFile {
    pub season: String,
    pub base_coef_home_equal: f64,
    pub flip_coef: f64,
    pub teams: Vec<SeasonFileTeam>,
    #[serde(default)]
    pub matches: Vec<SeasonFileMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonFileTeam {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonFileMatch {
    pub date: DateTime<Utc>,
    /// Team name or alias.
    pub home: String,
    pub away: String,
    pub k_home: f64,
    pub k_draw: f64,
    pub k_away: f64,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub tour_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub season: Season,
    pub teams: usize,
    pub matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchEdge {
    pub date: DateTime<Utc>,
    pub home: String,
    pub away: String,
    pub computed: MatchComputed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonEvaluation {
    pub calibration: Calibration,
    pub edges: Vec<MatchEdge>,
    /// Team name and rating, strongest first.
    pub strengths: Vec<(String, f64)>,
}

impl SeasonEvaluation {
    pub fn strength_of(&self, team: &str) -> Option<f64> {
        let key = clean_text(team).to_lowercase();
        self.strengths
            .iter()
            .find(|(name, _)| name.to_lowercase() == key)
            .map(|(_, s)| *s)
    }

    pub fn quote(&self, home: &str, away: &str) -> Result<OddsQuote> {
        let h = self
            .strength_of(home)
            .ok_or_else(|| anyhow!("unknown team {home}"))?;
        let a = self
            .strength_of(away)
            .ok_or_else(|| anyhow!("unknown team {away}"))?;
        Ok(infer_odds(h, a, &self.calibration)?)
    }
}

impl SeasonFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read season file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse season file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: SeasonFile = serde_json::from_str(raw)?;
        Ok(file)
    }

    pub fn calibration(&self) -> Result<Calibration> {
        Ok(Calibration::new(self.base_coef_home_equal, self.flip_coef)?)
    }

    /// Index into `teams` of the team answering to `query` (name or alias).
    pub fn resolve_team(&self, query: &str) -> Option<usize> {
        let key = clean_text(query).to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.teams.iter().position(|t| {
            clean_text(&t.name).to_lowercase() == key
                || clean_aliases(&t.name, &t.aliases)
                    .iter()
                    .any(|a| a.to_lowercase() == key)
        })
    }

    fn resolve_pair(&self, m: &SeasonFileMatch) -> Result<(usize, usize)> {
        let home = self
            .resolve_team(&m.home)
            .ok_or_else(|| anyhow!("match on {}: unknown home team {:?}", m.date, m.home))?;
        let away = self
            .resolve_team(&m.away)
            .ok_or_else(|| anyhow!("match on {}: unknown away team {:?}", m.date, m.away))?;
        if home == away {
            return Err(anyhow!(
                "match on {}: {:?} and {:?} are the same team {}",
                m.date,
                m.home,
                m.away,
                self.teams[home].name
            ));
        }
        Ok((home, away))
    }

    /// Runs edge -> strength entirely in memory.
    pub fn evaluate(&self, half_life_days: Option<f64>, now: DateTime<Utc>) -> Result<SeasonEvaluation> {
        let calibration = self.calibration()?;
        let mut edges = Vec::with_capacity(self.matches.len());
        let mut rows = Vec::with_capacity(self.matches.len());
        for m in &self.matches {
            let (home, away) = self.resolve_pair(m)?;
            let odds = MatchOdds::new(m.k_home, m.k_draw, m.k_away)
                .with_context(|| format!("{} vs {} on {}", m.home, m.away, m.date))?;
            let computed = compute_edge(&odds, &calibration)?;
            rows.push(StrengthMatch {
                date: m.date,
                home_team_id: home as TeamId,
                away_team_id: away as TeamId,
                delta_home: computed.delta_home,
            });
            edges.push(MatchEdge {
                date: m.date,
                home: self.teams[home].name.clone(),
                away: self.teams[away].name.clone(),
                computed,
            });
        }

        let ids: Vec<TeamId> = (0..self.teams.len()).map(|i| i as TeamId).collect();
        let fit = estimate_strengths(&ids, &rows, Weighting::from_half_life(half_life_days), now)?;
        let mut strengths: Vec<(String, f64)> = fit
            .ratings
            .iter()
            .map(|(id, s)| (clean_text(&self.teams[*id as usize].name), *s))
            .collect();
        strengths.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(SeasonEvaluation {
            calibration,
            edges,
            strengths,
        })
    }

    /// Creates the season, its teams and matches under `league_id` in one
    /// transaction. Every match is resolved and priced before the first write.
    pub fn import_into(&self, store: &mut Store, league_id: i64) -> Result<ImportSummary> {
        let calibration = self.calibration()?;
        let mut pairs = Vec::with_capacity(self.matches.len());
        for m in &self.matches {
            let (home, away) = self.resolve_pair(m)?;
            let odds = MatchOdds::new(m.k_home, m.k_draw, m.k_away)
                .with_context(|| format!("{} vs {} on {}", m.home, m.away, m.date))?;
            compute_edge(&odds, &calibration)
                .with_context(|| format!("{} vs {} on {}", m.home, m.away, m.date))?;
            pairs.push((home, away));
        }

        let tx = store.conn.transaction().context("begin season import")?;
        let season_id = insert_season(
            &tx,
            &NewSeason {
                league_id,
                name: self.season.clone(),
                base_coef_home_equal: self.base_coef_home_equal,
                flip_coef: self.flip_coef,
            },
        )?;

        let mut team_ids = Vec::with_capacity(self.teams.len());
        for t in &self.teams {
            let id = insert_team(
                &tx,
                &NewTeam {
                    season_id,
                    name: t.name.clone(),
                    aliases: t.aliases.clone(),
                },
            )
            .with_context(|| format!("import team {}", t.name))?;
            team_ids.push(id);
        }

        for (m, (home, away)) in self.matches.iter().zip(pairs) {
            insert_match(
                &tx,
                &NewMatch {
                    season_id,
                    tour_id: m.tour_id.clone(),
                    date: m.date,
                    market_type: Default::default(),
                    home_team_id: team_ids[home],
                    away_team_id: team_ids[away],
                    k_home: m.k_home,
                    k_draw: m.k_draw,
                    k_away: m.k_away,
                    total: m.total,
                },
            )
            .with_context(|| format!("import match {} vs {} on {}", m.home, m.away, m.date))?;
        }
        tx.commit().context("commit season import")?;

        info!(
            season_id,
            teams = team_ids.len(),
            matches = self.matches.len(),
            "season file imported"
        );
        Ok(ImportSummary {
            season: store.get_season(season_id)?,
            teams: team_ids.len(),
            matches: self.matches.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"{
        "season": "Test",
        "base_coef_home_equal": 2.4,
        "flip_coef": 1.0,
        "teams": [
            {"name": "North FC", "aliases": ["North"]},
            {"name": "South United"}
        ],
        "matches": [
            {"date": "2024-08-10T15:00:00Z", "home": "north", "away": "South United",
             "k_home": 1.8, "k_draw": 3.5, "k_away": 4.5}
        ]
    }"#;

    #[test]
    fn resolves_names_and_aliases() {
        let file = SeasonFile::parse(RAW).unwrap();
        assert_eq!(file.resolve_team("NORTH fc"), Some(0));
        assert_eq!(file.resolve_team(" north "), Some(0));
        assert_eq!(file.resolve_team("south united"), Some(1));
        assert_eq!(file.resolve_team("East"), None);
    }

    #[test]
    fn unknown_team_in_match_is_an_error() {
        let mut file = SeasonFile::parse(RAW).unwrap();
        file.matches[0].away = "Nowhere".to_string();
        let err = file.evaluate(None, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("Nowhere"));
    }

    #[test]
    fn self_match_is_rejected() {
        let mut file = SeasonFile::parse(RAW).unwrap();
        file.matches[0].away = "North".to_string();
        let err = file.evaluate(None, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("same team North FC"));
    }

    #[test]
    fn failed_import_leaves_nothing_behind() {
        let mut file = SeasonFile::parse(RAW).unwrap();
        let mut second = file.matches[0].clone();
        second.date = "2024-08-17T15:00:00Z".parse().unwrap();
        second.k_home = 3.0;
        second.k_away = 2.2;
        file.matches.push(second.clone());
        second.date = "2024-08-24T15:00:00Z".parse().unwrap();
        second.away = "NORTH".to_string();
        file.matches.push(second);

        let mut store = Store::open_in_memory().unwrap();
        let league = store
            .create_league(crate::model::SportKey::Football, "Test", None)
            .unwrap();
        assert!(file.import_into(&mut store, league.id).is_err());
        assert!(store.list_seasons(league.id).unwrap().is_empty());

        file.matches.pop();
        let summary = file.import_into(&mut store, league.id).unwrap();
        assert_eq!(summary.matches, 2);
        assert_eq!(store.list_matches(summary.season.id).unwrap().len(), 2);
    }

    #[test]
    fn store_conflict_rolls_back_the_whole_import() {
        let mut file = SeasonFile::parse(RAW).unwrap();
        file.matches.push(file.matches[0].clone());

        let mut store = Store::open_in_memory().unwrap();
        let league = store
            .create_league(crate::model::SportKey::Football, "Test", None)
            .unwrap();
        let err = file.import_into(&mut store, league.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::StoreError>(),
            Some(crate::error::StoreError::Conflict(_))
        ));
        assert!(store.list_seasons(league.id).unwrap().is_empty());
    }

    #[test]
    fn single_match_splits_the_delta() {
        let file = SeasonFile::parse(RAW).unwrap();
        let eval = file.evaluate(None, Utc::now()).unwrap();
        let delta = eval.edges[0].computed.delta_home;
        assert!((delta - 13.888_889).abs() < 1e-4);
        assert!((eval.strength_of("North FC").unwrap() - delta / 2.0).abs() < 1e-6);
        let q = eval.quote("North FC", "South United").unwrap();
        assert!((q.coefficient - 1.8).abs() < 1e-6);
    }
}

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::edge::{Calibration, MatchComputed, MatchOdds};
use crate::strength::{TeamId, Weighting};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SportKey {
    Football,
    Hockey,
}

impl SportKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SportKey::Football => "football",
            SportKey::Hockey => "hockey",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "football" | "soccer" => Some(SportKey::Football),
            "hockey" => Some(SportKey::Hockey),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    #[default]
    Match1x2RegularTime,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Match1x2RegularTime => "match_1x2_regular_time",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "match_1x2_regular_time" | "1x2" => Some(MarketType::Match1x2RegularTime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    pub sport: SportKey,
    pub name: String,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: i64,
    pub league_id: i64,
    pub name: String,
    pub base_coef_home_equal: f64,
    pub flip_coef: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Season {
    pub fn calibration(&self) -> Calibration {
        Calibration {
            base_coef_home_equal: self.base_coef_home_equal,
            flip_coef: self.flip_coef,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub season_id: i64,
    pub name: String,
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Case-insensitive match against the name or any alias.
    pub fn answers_to(&self, query: &str) -> bool {
        let q = clean_text(query).to_lowercase();
        if q.is_empty() {
            return false;
        }
        self.name.to_lowercase() == q || self.aliases.iter().any(|a| a.to_lowercase() == q)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub season_id: i64,
    pub tour_id: Option<String>,
    pub date: DateTime<Utc>,
    pub market_type: MarketType,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub home_team_name: String,
    pub away_team_name: String,
    pub k_home: f64,
    pub k_draw: f64,
    pub k_away: f64,
    pub total: Option<f64>,
    pub computed: Option<MatchComputed>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn odds(&self) -> MatchOdds {
        MatchOdds {
            k_home: self.k_home,
            k_draw: self.k_draw,
            k_away: self.k_away,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchesPage {
    pub matches: Vec<Match>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthValue {
    pub team_id: TeamId,
    pub team_name: String,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthSnapshot {
    pub id: i64,
    pub season_id: i64,
    /// Inclusive lower bound of the match window.
    pub from_date: Option<DateTime<Utc>>,
    /// Exclusive upper bound; `None` means everything up to creation time.
    pub to_date: Option<DateTime<Utc>>,
    pub weighting: Weighting,
    pub created_at: DateTime<Utc>,
    /// Sorted strongest first.
    pub values: Vec<StrengthValue>,
}

impl StrengthSnapshot {
    pub fn value_for(&self, team_id: TeamId) -> Option<&StrengthValue> {
        self.values.iter().find(|v| v.team_id == team_id)
    }
}

/// Trim and collapse runs of whitespace to a single space.
pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleans aliases, drops empty ones and ones equal to the team name, and
/// de-duplicates case-insensitively keeping the first spelling.
pub fn clean_aliases<S: AsRef<str>>(name: &str, aliases: &[S]) -> Vec<String> {
    let name_key = clean_text(name).to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in aliases {
        let alias = clean_text(raw.as_ref());
        if alias.is_empty() {
            continue;
        }
        let key = alias.to_lowercase();
        if key == name_key {
            continue;
        }
        if seen.insert(key) {
            out.push(alias);
        }
    }
    out
}

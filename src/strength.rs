//! Latent team strength from match deltas.
//!
//! Fits `strength[home] - strength[away] ~ delta_home` by weighted least
//! squares. The difference model only pins ratings up to a common offset, so
//! a rank-one penalty on the mean is added to the normal equations and the
//! solved vector is re-centred afterwards.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

pub type TeamId = i64;

/// Penalty added to every entry of the normal matrix to fix the gauge.
pub const GAUGE_LAMBDA: f64 = 1e6;
/// Smallest pivot magnitude accepted by the elimination.
pub const PIVOT_EPSILON: f64 = 1e-12;
/// Floor for decayed weights so old matches still contribute a row.
pub const MIN_WEIGHT: f64 = 1e-12;

const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthMatch {
    pub date: DateTime<Utc>,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub delta_home: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Weighting {
    None,
    ExpDecay { half_life_days: f64 },
}

impl Weighting {
    pub fn from_half_life(half_life_days: Option<f64>) -> Self {
        match half_life_days {
            Some(h) => Self::ExpDecay { half_life_days: h },
            None => Self::None,
        }
    }

    pub fn half_life_days(&self) -> Option<f64> {
        match self {
            Self::None => None,
            Self::ExpDecay { half_life_days } => Some(*half_life_days),
        }
    }

    pub fn mode_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ExpDecay { .. } => "exp_decay",
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if let Self::ExpDecay { half_life_days } = *self
            && (!half_life_days.is_finite() || half_life_days <= 0.0)
        {
            return Err(EngineError::InvalidHalfLife(half_life_days));
        }
        Ok(())
    }

    fn weight(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        match *self {
            Self::None => 1.0,
            Self::ExpDecay { half_life_days } => decay_weight(date, now, half_life_days),
        }
    }
}

/// `exp(-days_ago / half_life)` floored at [`MIN_WEIGHT`]. Matches dated after
/// `now` count as zero days old.
pub fn decay_weight(date: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let elapsed_ms = (now - date).num_milliseconds() as f64;
    let days_ago = (elapsed_ms / MS_PER_DAY).max(0.0);
    (-days_ago / half_life_days).exp().max(MIN_WEIGHT)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthFit {
    /// One rating per input team, in input order. Sums to zero.
    pub ratings: Vec<(TeamId, f64)>,
    pub rows_used: usize,
    pub rows_skipped: usize,
}

impl StrengthFit {
    pub fn rating(&self, team_id: TeamId) -> Option<f64> {
        self.ratings
            .iter()
            .find(|(id, _)| *id == team_id)
            .map(|(_, s)| *s)
    }
}

pub fn estimate_strengths(
    teams: &[TeamId],
    matches: &[StrengthMatch],
    weighting: Weighting,
    now: DateTime<Utc>,
) -> EngineResult<StrengthFit> {
    let n = teams.len();
    if n < 2 {
        return Err(EngineError::InsufficientTeams(n));
    }
    if matches.is_empty() {
        return Err(EngineError::NoMatches);
    }
    weighting.validate()?;

    let index: HashMap<TeamId, usize> = teams.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut m = vec![vec![0.0_f64; n]; n];
    let mut y = vec![0.0_f64; n];
    let mut rows_used = 0usize;
    let mut rows_skipped = 0usize;
    let mut links = Components::new(n);

    for row in matches {
        let (Some(&hi), Some(&ai)) = (index.get(&row.home_team_id), index.get(&row.away_team_id))
        else {
            rows_skipped += 1;
            continue;
        };
        let w = weighting.weight(row.date, now).max(MIN_WEIGHT);

        m[hi][hi] += w;
        m[ai][ai] += w;
        m[hi][ai] -= w;
        m[ai][hi] -= w;

        y[hi] += w * row.delta_home;
        y[ai] -= w * row.delta_home;
        links.union(hi, ai);
        rows_used += 1;
    }
    if rows_skipped > 0 {
        debug!(rows_skipped, rows_used, "matches with teams outside the fit were ignored");
    }

    // Decayed weights leave rounding residue against the penalty, so a
    // disconnected graph is not reliably caught by the pivot test alone.
    if let Some(column) = links.first_detached() {
        debug!(column, rows_used, "match graph does not connect every team");
        return Err(EngineError::SingularSystem { column, pivot: 0.0 });
    }

    for row in m.iter_mut() {
        for cell in row.iter_mut() {
            *cell += GAUGE_LAMBDA;
        }
    }

    let mut x = solve_linear_system(m, &y)?;
    let mean = x.iter().sum::<f64>() / n as f64;
    for v in x.iter_mut() {
        *v -= mean;
    }

    Ok(StrengthFit {
        ratings: teams.iter().copied().zip(x).collect(),
        rows_used,
        rows_skipped,
    })
}

/// Union-find over team indices linked by at least one fitted match.
struct Components {
    parent: Vec<usize>,
}

impl Components {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }

    /// First index not in the component of index 0.
    fn first_detached(&mut self) -> Option<usize> {
        let root = self.find(0);
        (1..self.parent.len()).find(|&i| self.find(i) != root)
    }
}

/// Gauss-Jordan elimination with partial pivoting on `[m | y]`.
pub fn solve_linear_system(m: Vec<Vec<f64>>, y: &[f64]) -> EngineResult<Vec<f64>> {
    let n = y.len();
    let mut a: Vec<Vec<f64>> = m
        .into_iter()
        .zip(y)
        .map(|(mut row, &rhs)| {
            row.push(rhs);
            row
        })
        .collect();

    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_val = a[col][col].abs();
        for (r, row) in a.iter().enumerate().skip(col + 1) {
            let v = row[col].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = r;
            }
        }
        if !pivot_val.is_finite() || pivot_val < PIVOT_EPSILON {
            return Err(EngineError::SingularSystem {
                column: col,
                pivot: pivot_val,
            });
        }
        a.swap(col, pivot_row);

        let pivot = a[col][col];
        for c in col..=n {
            a[col][c] /= pivot;
        }

        let pivot_tail = a[col].clone();
        for (r, row) in a.iter_mut().enumerate() {
            if r == col {
                continue;
            }
            let factor = row[col];
            if factor == 0.0 {
                continue;
            }
            for c in col..=n {
                row[c] -= factor * pivot_tail[c];
            }
        }
    }

    Ok(a.into_iter().map(|row| row[n]).collect())
}

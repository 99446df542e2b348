use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::odds::{check_odds, from_flip, implied_probability, to_flip};

/// Season-level constants the edge and the inverse quote are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Decimal odds of the home side when both teams are rated equal.
    pub base_coef_home_equal: f64,
    /// Scale applied in flip space to move away odds onto the home scale.
    pub flip_coef: f64,
}

impl Calibration {
    pub fn new(base_coef_home_equal: f64, flip_coef: f64) -> EngineResult<Self> {
        let cal = Self {
            base_coef_home_equal,
            flip_coef,
        };
        cal.validate()?;
        Ok(cal)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.base_coef_home_equal.is_finite() || self.base_coef_home_equal <= 1.0 {
            return Err(EngineError::InvalidCalibration(format!(
                "base_coef_home_equal must be > 1, got {}",
                self.base_coef_home_equal
            )));
        }
        if !self.flip_coef.is_finite() || self.flip_coef <= 0.0 {
            return Err(EngineError::InvalidCalibration(format!(
                "flip_coef must be > 0, got {}",
                self.flip_coef
            )));
        }
        Ok(())
    }

    /// Baseline home probability in percent.
    pub fn home_base_prob(&self) -> f64 {
        100.0 / self.base_coef_home_equal
    }

    /// Equal-strength odds of the away side: the home baseline pushed through
    /// flip space in the reverse direction of [`effective_home_odds`].
    pub fn away_equal_coef(&self) -> EngineResult<f64> {
        let flip_home = to_flip(self.base_coef_home_equal)?;
        from_flip(flip_home / self.flip_coef)
    }

    /// Baseline away probability in percent.
    pub fn away_base_prob(&self) -> EngineResult<f64> {
        Ok(100.0 / self.away_equal_coef()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOdds {
    pub k_home: f64,
    pub k_draw: f64,
    pub k_away: f64,
}

impl MatchOdds {
    pub fn new(k_home: f64, k_draw: f64, k_away: f64) -> EngineResult<Self> {
        let odds = Self {
            k_home,
            k_draw,
            k_away,
        };
        odds.validate()?;
        Ok(odds)
    }

    pub fn validate(&self) -> EngineResult<()> {
        check_odds(self.k_home)?;
        check_odds(self.k_draw)?;
        check_odds(self.k_away)
    }

    pub fn favorite(&self) -> Side {
        if self.k_away < self.k_home {
            Side::Away
        } else {
            Side::Home
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

/// Derived numbers persisted next to every match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchComputed {
    pub base_prob_used: f64,
    pub p_home_implied: f64,
    pub p_draw_implied: f64,
    pub p_away_implied: f64,
    pub delta_home: f64,
    pub delta_away: f64,
}

/// Home odds on the favourite scale. Untouched when home is favourite or
/// level; otherwise the away odds are mapped over with `flip_coef`.
pub fn effective_home_odds(odds: &MatchOdds, cal: &Calibration) -> EngineResult<f64> {
    check_odds(odds.k_home)?;
    check_odds(odds.k_away)?;
    if odds.k_home <= odds.k_away {
        return Ok(odds.k_home);
    }

    if !cal.flip_coef.is_finite() || cal.flip_coef <= 0.0 {
        return Err(EngineError::InvalidCalibration(format!(
            "flip_coef must be > 0, got {}",
            cal.flip_coef
        )));
    }
    let flip_as_home = to_flip(odds.k_away)? * cal.flip_coef;
    let k_home_effective = from_flip(flip_as_home)?;
    if !k_home_effective.is_finite() || k_home_effective <= 1.0 {
        return Err(EngineError::InvalidCalibration(format!(
            "effective home odds {k_home_effective} out of range"
        )));
    }
    Ok(k_home_effective)
}

pub fn compute_edge(odds: &MatchOdds, cal: &Calibration) -> EngineResult<MatchComputed> {
    odds.validate()?;
    cal.validate()?;

    let k_home_effective = effective_home_odds(odds, cal)?;
    let p_home_implied = implied_probability(k_home_effective)?;
    let p_draw_implied = implied_probability(odds.k_draw)?;
    let p_away_implied = implied_probability(odds.k_away)?;

    for (label, p) in [("home", p_home_implied), ("away", p_away_implied)] {
        if !p.is_finite() || p <= 0.0 {
            return Err(EngineError::InvalidCalibration(format!(
                "implied probability for {label} is {p}"
            )));
        }
    }

    let (base_prob_used, delta_home, delta_away) = match odds.favorite() {
        Side::Away => {
            let base = cal.away_base_prob()?;
            let delta_away = 100.0 * p_away_implied - base;
            (base, -delta_away, delta_away)
        }
        Side::Home => {
            let base = cal.home_base_prob();
            let delta_home = 100.0 * p_home_implied - base;
            (base, delta_home, -delta_home)
        }
    };

    Ok(MatchComputed {
        base_prob_used,
        p_home_implied,
        p_draw_implied,
        p_away_implied,
        delta_home,
        delta_away,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal(base: f64, flip: f64) -> Calibration {
        Calibration::new(base, flip).unwrap()
    }

    #[test]
    fn home_favourite_keeps_raw_odds() {
        let odds = MatchOdds::new(1.80, 3.50, 4.50).unwrap();
        let out = compute_edge(&odds, &cal(2.40, 1.0)).unwrap();
        assert!((out.p_home_implied - 0.555_556).abs() < 1e-6);
        assert!((out.p_draw_implied - 1.0 / 3.5).abs() < 1e-12);
        assert!((out.p_away_implied - 1.0 / 4.5).abs() < 1e-12);
        assert!((out.base_prob_used - 41.666_667).abs() < 1e-4);
        assert!((out.delta_home - 13.888_889).abs() < 1e-4);
        assert_eq!(out.delta_away, -out.delta_home);
    }

    #[test]
    fn level_odds_take_home_branch() {
        let odds = MatchOdds::new(2.60, 3.20, 2.60).unwrap();
        let c = cal(2.40, 1.3);
        assert_eq!(effective_home_odds(&odds, &c).unwrap(), 2.60);
        let out = compute_edge(&odds, &c).unwrap();
        assert!((out.base_prob_used - 100.0 / 2.40).abs() < 1e-12);
    }

    #[test]
    fn away_favourite_maps_through_flip() {
        // kAway = 1.5 -> flip 2.0; * 1.25 -> 2.5; back to odds 1.4.
        let odds = MatchOdds::new(5.0, 4.0, 1.5).unwrap();
        let c = cal(2.0, 1.25);
        let k_eff = effective_home_odds(&odds, &c).unwrap();
        assert!((k_eff - 1.4).abs() < 1e-12);
        assert_ne!(k_eff, odds.k_home);

        // base 2.0 -> flip 1.0; / 1.25 -> 0.8; odds 2.25; base prob 44.44%.
        let out = compute_edge(&odds, &c).unwrap();
        assert!((out.base_prob_used - 100.0 / 2.25).abs() < 1e-9);
        assert!((out.p_home_implied - 1.0 / 1.4).abs() < 1e-12);
        let expected_away = 100.0 / 1.5 - 100.0 / 2.25;
        assert!((out.delta_away - expected_away).abs() < 1e-9);
        assert_eq!(out.delta_home, -out.delta_away);
    }

    #[test]
    fn odds_of_exactly_one_are_rejected() {
        let odds = MatchOdds {
            k_home: 2.0,
            k_draw: 3.0,
            k_away: 1.0,
        };
        assert_eq!(
            compute_edge(&odds, &cal(2.0, 1.0)),
            Err(EngineError::InvalidOdds(1.0))
        );
    }

    #[test]
    fn bad_calibration_is_rejected() {
        let odds = MatchOdds::new(1.9, 3.4, 4.0).unwrap();
        let base_bad = Calibration {
            base_coef_home_equal: 1.0,
            flip_coef: 1.0,
        };
        assert!(matches!(
            compute_edge(&odds, &base_bad),
            Err(EngineError::InvalidCalibration(_))
        ));
        let flip_bad = Calibration {
            base_coef_home_equal: 2.2,
            flip_coef: 0.0,
        };
        assert!(matches!(
            effective_home_odds(&MatchOdds::new(4.0, 3.4, 1.9).unwrap(), &flip_bad),
            Err(EngineError::InvalidCalibration(_))
        ));
    }
}

use serde::{Deserialize, Serialize};

use crate::edge::Calibration;
use crate::error::{EngineError, EngineResult};

/// Synthetic price for the side the ratings make favourite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub coefficient: f64,
    pub is_home_team: bool,
    /// Delta of the quoted side, in percentage points.
    pub delta: f64,
    pub implied_probability: f64,
}

/// Runs the edge calculation backwards: rating gap -> delta -> probability ->
/// decimal odds, using the same favourite branches.
pub fn infer_odds(home_strength: f64, away_strength: f64, cal: &Calibration) -> EngineResult<OddsQuote> {
    cal.validate()?;
    let delta_home = home_strength - away_strength;
    let delta_away = -delta_home;

    if delta_home < 0.0 {
        let p = (cal.away_base_prob()? + delta_away) / 100.0;
        check_probability(p)?;
        return Ok(OddsQuote {
            coefficient: 1.0 / p,
            is_home_team: false,
            delta: delta_away,
            implied_probability: p,
        });
    }

    let p = (cal.home_base_prob() + delta_home) / 100.0;
    check_probability(p)?;
    Ok(OddsQuote {
        coefficient: 1.0 / p,
        is_home_team: true,
        delta: delta_home,
        implied_probability: p,
    })
}

fn check_probability(p: f64) -> EngineResult<()> {
    if !p.is_finite() || p <= 0.0 || p >= 1.0 {
        return Err(EngineError::InvalidResult(p));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{MatchOdds, compute_edge};

    #[test]
    fn equal_ratings_quote_the_home_baseline() {
        let cal = Calibration::new(2.40, 1.1).unwrap();
        let q = infer_odds(1.5, 1.5, &cal).unwrap();
        assert!(q.is_home_team);
        assert!((q.coefficient - 2.40).abs() < 1e-12);
        assert_eq!(q.delta, 0.0);
    }

    #[test]
    fn inverts_the_home_branch_of_the_edge() {
        let cal = Calibration::new(2.40, 1.0).unwrap();
        let edge = compute_edge(&MatchOdds::new(1.80, 3.50, 4.50).unwrap(), &cal).unwrap();
        let q = infer_odds(edge.delta_home, 0.0, &cal).unwrap();
        assert!(q.is_home_team);
        assert!((q.coefficient - 1.80).abs() < 1e-9);
    }

    #[test]
    fn inverts_the_away_branch_of_the_edge() {
        let cal = Calibration::new(2.20, 1.35).unwrap();
        let edge = compute_edge(&MatchOdds::new(4.20, 3.60, 1.75).unwrap(), &cal).unwrap();
        assert!(edge.delta_home < 0.0);
        let q = infer_odds(0.0, edge.delta_away, &cal).unwrap();
        assert!(!q.is_home_team);
        assert!((q.coefficient - 1.75).abs() < 1e-9);
        assert!((q.delta - edge.delta_away).abs() < 1e-12);
    }

    #[test]
    fn impossible_gap_is_rejected() {
        let cal = Calibration::new(2.0, 1.0).unwrap();
        assert!(matches!(
            infer_odds(60.0, -10.0, &cal),
            Err(EngineError::InvalidResult(_))
        ));
        assert!(matches!(
            infer_odds(-60.0, 10.0, &cal),
            Err(EngineError::InvalidResult(_))
        ));
    }
}

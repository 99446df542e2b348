//! Conversions between decimal odds, flip space and implied probability.
//!
//! Flip space maps odds `(1, inf)` onto `(0, inf)` via `1 / (k - 1)`. The
//! favourite correction in [`crate::edge`] is a plain scaling in this space.

use crate::error::{EngineError, EngineResult};

pub fn implied_probability(k: f64) -> EngineResult<f64> {
    check_odds(k)?;
    Ok(1.0 / k)
}

pub fn to_flip(k: f64) -> EngineResult<f64> {
    check_odds(k)?;
    Ok(1.0 / (k - 1.0))
}

/// Exact inverse of [`to_flip`].
pub fn from_flip(f: f64) -> EngineResult<f64> {
    if !f.is_finite() || f <= 0.0 {
        return Err(EngineError::InvalidFlip(f));
    }
    Ok(1.0 / f + 1.0)
}

pub fn check_odds(k: f64) -> EngineResult<()> {
    if !k.is_finite() || k <= 1.0 {
        return Err(EngineError::InvalidOdds(k));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_round_trip() {
        for k in [1.0001, 1.05, 1.5, 1.8, 2.0, 2.4, 3.5, 7.25, 21.0, 501.0] {
            let back = from_flip(to_flip(k).unwrap()).unwrap();
            assert!((back - k).abs() < 1e-9, "k={k} back={back}");
        }
    }

    #[test]
    fn even_odds_sit_at_flip_one() {
        assert!((to_flip(2.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((implied_probability(2.0).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_odds_at_or_below_one() {
        assert_eq!(implied_probability(1.0), Err(EngineError::InvalidOdds(1.0)));
        assert_eq!(to_flip(0.5), Err(EngineError::InvalidOdds(0.5)));
        assert!(matches!(
            to_flip(f64::INFINITY),
            Err(EngineError::InvalidOdds(_))
        ));
        assert!(matches!(
            implied_probability(f64::NAN),
            Err(EngineError::InvalidOdds(_))
        ));
    }

    #[test]
    fn rejects_non_positive_flip() {
        assert_eq!(from_flip(0.0), Err(EngineError::InvalidFlip(0.0)));
        assert_eq!(from_flip(-1.0), Err(EngineError::InvalidFlip(-1.0)));
        assert!(matches!(from_flip(f64::NAN), Err(EngineError::InvalidFlip(_))));
    }
}

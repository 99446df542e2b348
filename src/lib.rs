//! Odds edges and latent team strength.
//!
//! The numeric engine lives in [`odds`], [`edge`], [`strength`] and
//! [`inference`]; everything else stores seasons, teams and matches in SQLite
//! and feeds the engine.

pub mod catalog;
pub mod config;
pub mod db;
pub mod edge;
pub mod error;
pub mod inference;
pub mod matches;
pub mod model;
pub mod odds;
pub mod season_file;
pub mod snapshots;
pub mod strength;

pub use db::Store;
pub use edge::{Calibration, MatchComputed, MatchOdds, compute_edge};
pub use error::{EngineError, StoreError};
pub use inference::{OddsQuote, infer_odds};
pub use strength::{StrengthFit, StrengthMatch, Weighting, estimate_strengths};

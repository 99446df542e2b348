use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

const CACHE_DIR: &str = "oddsline";
const DB_FILE: &str = "oddsline.sqlite";
const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Environment settings, read once. Values only some commands need are kept
/// raw and checked when asked for, so a bad one cannot break the others.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `ODDSLINE_DB`, else the cache-dir default; `None` when neither resolves.
    pub db_path: Option<PathBuf>,
    half_life_raw: Option<String>,
    pub page_size: usize,
}

impl AppConfig {
    /// Reads `.env.local` / `.env` (if present) and then the process environment.
    pub fn from_env() -> Self {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match lookup("ODDSLINE_DB").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(PathBuf::from(raw.trim())),
            None => app_cache_dir(&lookup).map(|dir| dir.join(DB_FILE)),
        };

        let half_life_raw = lookup("ODDSLINE_HALF_LIFE_DAYS")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        let page_size = lookup("ODDSLINE_PAGE_SIZE")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        Self {
            db_path,
            half_life_raw,
            page_size,
        }
    }

    /// `explicit` (the `--db` flag) wins over the environment.
    pub fn resolve_db_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => self
                .db_path
                .clone()
                .context("unable to resolve database path; set ODDSLINE_DB or pass --db"),
        }
    }

    /// Half-life used by `snapshot create` when none is passed; `None` means
    /// no decay.
    pub fn default_half_life_days(&self) -> Result<Option<f64>> {
        let Some(raw) = self.half_life_raw.as_deref() else {
            return Ok(None);
        };
        let value = raw
            .parse::<f64>()
            .with_context(|| format!("parse ODDSLINE_HALF_LIFE_DAYS={raw}"))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(anyhow!("ODDSLINE_HALF_LIFE_DAYS must be > 0, got {value}"));
        }
        Ok(Some(value))
    }
}

/// Missing files are fine.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

fn app_cache_dir<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    // Prefer XDG cache.
    if let Some(base) = lookup("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = lookup("HOME")?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

/// Installs the stderr subscriber used by the binaries. `RUST_LOG` wins over
/// the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oddsline=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_db_path_wins() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("ODDSLINE_DB", "/tmp/x.sqlite"),
            ("HOME", "/home/u"),
        ]));
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(cfg.default_half_life_days().unwrap(), None);
        assert_eq!(cfg.page_size, 20);
        assert_eq!(
            cfg.resolve_db_path(Some(Path::new("other.sqlite"))).unwrap(),
            PathBuf::from("other.sqlite")
        );
    }

    #[test]
    fn falls_back_to_xdg_then_home() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("XDG_CACHE_HOME", "/xdg")]));
        assert_eq!(
            cfg.resolve_db_path(None).unwrap(),
            PathBuf::from("/xdg/oddsline/oddsline.sqlite")
        );
        let cfg = AppConfig::from_lookup(lookup_from(&[("HOME", "/home/u")]));
        assert_eq!(
            cfg.resolve_db_path(None).unwrap(),
            PathBuf::from("/home/u/.cache/oddsline/oddsline.sqlite")
        );
    }

    #[test]
    fn flag_covers_an_unresolvable_environment() {
        let cfg = AppConfig::from_lookup(lookup_from(&[]));
        assert!(cfg.resolve_db_path(None).is_err());
        assert_eq!(
            cfg.resolve_db_path(Some(Path::new("/data/odds.sqlite"))).unwrap(),
            PathBuf::from("/data/odds.sqlite")
        );
    }

    #[test]
    fn half_life_is_checked_only_when_read() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("ODDSLINE_DB", "a.sqlite"),
            ("ODDSLINE_HALF_LIFE_DAYS", "45"),
            ("ODDSLINE_PAGE_SIZE", "500"),
        ]));
        assert_eq!(cfg.default_half_life_days().unwrap(), Some(45.0));
        assert_eq!(cfg.page_size, MAX_PAGE_SIZE);

        for bad in ["-3", "soon"] {
            let cfg = AppConfig::from_lookup(lookup_from(&[
                ("ODDSLINE_DB", "a.sqlite"),
                ("ODDSLINE_HALF_LIFE_DAYS", bad),
            ]));
            assert!(cfg.resolve_db_path(None).is_ok());
            assert!(cfg.default_half_life_days().is_err());
        }
    }
}

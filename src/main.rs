use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use oddsline::catalog::{NewSeason, NewTeam, SeasonPatch};
use oddsline::config::{AppConfig, init_tracing};
use oddsline::matches::{MatchPatch, NewMatch};
use oddsline::model::{Match, SportKey, StrengthSnapshot};
use oddsline::season_file::SeasonFile;
use oddsline::snapshots::SnapshotRequest;
use oddsline::Store;

const USAGE: &str = "\
usage: oddsline [--db PATH] [--json] <command> [options]

  league add --sport football|hockey --name NAME [--country C]
  league list
  season add --league ID --name NAME --base ODDS --flip COEF
  season set --id ID [--name NAME] [--base ODDS] [--flip COEF]
  season show --id ID
  season list --league ID
  team add --season ID --name NAME [--aliases A,B]
  team list --season ID
  team find --season ID --query TEXT
  match add --season ID --date DATE --home TEAM --away TEAM --odds H,D,A [--total T] [--tour X]
  match update --id ID [--date DATE] [--home TEAM] [--away TEAM] [--odds H,D,A] [--total T]
  match delete --id ID
  match list --season ID [--page N] [--page-size N]
  import FILE --league ID
  snapshot create --season ID [--from DATE] [--to DATE] [--half-life DAYS]
  snapshot show --id ID
  snapshot list --season ID
  quote --snapshot ID --home TEAM --away TEAM

TEAM is a team id or a name/alias; DATE is RFC 3339 or YYYY-MM-DD (UTC).";

#[derive(Debug, Serialize)]
struct Deleted {
    deleted: &'static str,
    id: i64,
}

struct Args {
    positional: Vec<String>,
    options: HashMap<String, String>,
    json: bool,
}

impl Args {
    fn parse(raw: impl IntoIterator<Item = String>) -> Result<Self> {
        let raw = raw.into_iter().collect::<Vec<_>>();
        let mut positional = Vec::new();
        let mut options = HashMap::new();
        let mut json = false;
        let mut idx = 0;
        while idx < raw.len() {
            let arg = &raw[idx];
            if arg == "--json" {
                json = true;
            } else if let Some(opt) = arg.strip_prefix("--") {
                if let Some((key, value)) = opt.split_once('=') {
                    options.insert(key.to_string(), value.to_string());
                } else {
                    let Some(value) = raw.get(idx + 1) else {
                        bail!("missing value for --{opt}");
                    };
                    options.insert(opt.to_string(), value.clone());
                    idx += 1;
                }
            } else {
                positional.push(arg.clone());
            }
            idx += 1;
        }
        Ok(Self {
            positional,
            options,
            json,
        })
    }

    fn opt(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn req(&self, key: &str) -> Result<&str> {
        self.opt(key).ok_or_else(|| anyhow!("missing --{key}"))
    }

    fn id(&self, key: &str) -> Result<i64> {
        let raw = self.req(key)?;
        raw.parse::<i64>()
            .with_context(|| format!("--{key} must be an integer id, got {raw}"))
    }

    fn f64_opt(&self, key: &str) -> Result<Option<f64>> {
        self.opt(key)
            .map(|raw| {
                raw.parse::<f64>()
                    .with_context(|| format!("--{key} must be a number, got {raw}"))
            })
            .transpose()
    }

    fn date_opt(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        self.opt(key).map(parse_date).transpose()
    }
}

fn main() -> Result<()> {
    let cfg = AppConfig::from_env();
    init_tracing();
    let args = Args::parse(std::env::args().skip(1))?;
    if args.positional.is_empty() {
        println!("{USAGE}");
        return Ok(());
    }

    let db_path = cfg.resolve_db_path(args.opt("db").map(Path::new))?;
    let mut store = Store::open(&db_path)?;

    let command = args
        .positional
        .iter()
        .take(2)
        .map(String::as_str)
        .collect::<Vec<_>>();
    match command.as_slice() {
        ["league", "add"] => {
            let sport_raw = args.req("sport")?;
            let sport =
                SportKey::parse(sport_raw).ok_or_else(|| anyhow!("unknown sport {sport_raw}"))?;
            let league = store.create_league(sport, args.req("name")?, args.opt("country"))?;
            emit(&args, &league, || {
                println!("league {} created: {} ({})", league.id, league.name, league.sport.as_str())
            })
        }
        ["league", "list"] => {
            let leagues = store.list_leagues()?;
            emit(&args, &leagues, || {
                for l in &leagues {
                    println!(
                        "{:>4}  {:<8}  {}{}",
                        l.id,
                        l.sport.as_str(),
                        l.name,
                        l.country
                            .as_deref()
                            .map(|c| format!(" [{c}]"))
                            .unwrap_or_default()
                    );
                }
            })
        }
        ["season", "add"] => {
            let season = store.create_season(&NewSeason {
                league_id: args.id("league")?,
                name: args.req("name")?.to_string(),
                base_coef_home_equal: args.f64_opt("base")?.context("missing --base")?,
                flip_coef: args.f64_opt("flip")?.context("missing --flip")?,
            })?;
            emit(&args, &season, || {
                println!(
                    "season {} created: {} base={} flip={}",
                    season.id, season.name, season.base_coef_home_equal, season.flip_coef
                )
            })
        }
        ["season", "set"] => {
            let season = store.update_season(
                args.id("id")?,
                &SeasonPatch {
                    name: args.opt("name").map(str::to_string),
                    base_coef_home_equal: args.f64_opt("base")?,
                    flip_coef: args.f64_opt("flip")?,
                },
            )?;
            emit(&args, &season, || {
                println!(
                    "season {} updated: {} base={} flip={}",
                    season.id, season.name, season.base_coef_home_equal, season.flip_coef
                )
            })
        }
        ["season", "show"] => {
            let season = store.get_season(args.id("id")?)?;
            emit(&args, &season, || {
                println!("{} (league {})", season.name, season.league_id);
                println!("  base_coef_home_equal: {}", season.base_coef_home_equal);
                println!("  flip_coef:            {}", season.flip_coef);
            })
        }
        ["season", "list"] => {
            let seasons = store.list_seasons(args.id("league")?)?;
            emit(&args, &seasons, || {
                for s in &seasons {
                    println!(
                        "{:>4}  {:<16} base={:<6} flip={}",
                        s.id, s.name, s.base_coef_home_equal, s.flip_coef
                    );
                }
            })
        }
        ["team", "add"] => {
            let aliases = args
                .opt("aliases")
                .map(|raw| raw.split(',').map(str::to_string).collect())
                .unwrap_or_default();
            let team = store.create_team(&NewTeam {
                season_id: args.id("season")?,
                name: args.req("name")?.to_string(),
                aliases,
            })?;
            emit(&args, &team, || println!("team {} created: {}", team.id, team.name))
        }
        ["team", "list"] => {
            let teams = store.list_teams(args.id("season")?)?;
            emit(&args, &teams, || {
                for t in &teams {
                    println!("{:>4}  {}  {}", t.id, t.name, t.aliases.join(", "));
                }
            })
        }
        ["team", "find"] => {
            let team = store.find_team(args.id("season")?, args.req("query")?)?;
            emit(&args, &team, || match &team {
                Some(t) => println!("{:>4}  {}", t.id, t.name),
                None => println!("no team matches"),
            })
        }
        ["match", "add"] => {
            let season_id = args.id("season")?;
            let (k_home, k_draw, k_away) = parse_odds(args.req("odds")?)?;
            let home_team_id = resolve_team(&store, season_id, args.req("home")?)?;
            let away_team_id = resolve_team(&store, season_id, args.req("away")?)?;
            let m = store.create_match(&NewMatch {
                season_id,
                tour_id: args.opt("tour").map(str::to_string),
                date: args.date_opt("date")?.context("missing --date")?,
                market_type: Default::default(),
                home_team_id,
                away_team_id,
                k_home,
                k_draw,
                k_away,
                total: args.f64_opt("total")?,
            })?;
            emit(&args, &m, || print_match(&m))
        }
        ["match", "update"] => {
            let id = args.id("id")?;
            let season_id = store.get_match(id)?.season_id;
            let odds = args.opt("odds").map(parse_odds).transpose()?;
            let patch = MatchPatch {
                tour_id: args.opt("tour").map(|t| Some(t.to_string())),
                date: args.date_opt("date")?,
                home_team_id: args
                    .opt("home")
                    .map(|q| resolve_team(&store, season_id, q))
                    .transpose()?,
                away_team_id: args
                    .opt("away")
                    .map(|q| resolve_team(&store, season_id, q))
                    .transpose()?,
                k_home: odds.map(|o| o.0),
                k_draw: odds.map(|o| o.1),
                k_away: odds.map(|o| o.2),
                total: args.f64_opt("total")?.map(Some),
            };
            let m = store.update_match(id, &patch)?;
            emit(&args, &m, || print_match(&m))
        }
        ["match", "delete"] => {
            let id = args.id("id")?;
            store.delete_match(id)?;
            let deleted = Deleted { deleted: "match", id };
            emit(&args, &deleted, || println!("match {id} deleted"))
        }
        ["match", "list"] => {
            let page_size = match args.opt("page-size") {
                Some(raw) => raw.parse::<usize>().context("--page-size must be an integer")?,
                None => cfg.page_size,
            };
            let page = match args.opt("page") {
                Some(raw) => raw.parse::<usize>().context("--page must be an integer")?,
                None => 1,
            };
            let listing = store.list_matches_page(args.id("season")?, page, page_size)?;
            emit(&args, &listing, || {
                for m in &listing.matches {
                    print_match(m);
                }
                println!(
                    "page {}/{} ({} matches)",
                    listing.page, listing.total_pages, listing.total_count
                );
            })
        }
        ["import", ..] => {
            let path = args
                .positional
                .get(1)
                .context("import needs a season file path")?;
            let file = SeasonFile::load(&PathBuf::from(path))?;
            let summary = file.import_into(&mut store, args.id("league")?)?;
            emit(&args, &summary, || {
                println!(
                    "season {} ({}) imported: {} teams, {} matches",
                    summary.season.id, summary.season.name, summary.teams, summary.matches
                )
            })
        }
        ["snapshot", "create"] => {
            let half_life_days = match args.f64_opt("half-life")? {
                Some(days) => Some(days),
                None => cfg.default_half_life_days()?,
            };
            let snapshot = store.create_snapshot(&SnapshotRequest {
                season_id: args.id("season")?,
                from_date: args.date_opt("from")?,
                to_date: args.date_opt("to")?,
                half_life_days,
            })?;
            emit(&args, &snapshot, || print_snapshot(&snapshot))
        }
        ["snapshot", "show"] => {
            let snapshot = store.get_snapshot(args.id("id")?)?;
            emit(&args, &snapshot, || print_snapshot(&snapshot))
        }
        ["snapshot", "list"] => {
            let snapshots = store.list_snapshots(args.id("season")?)?;
            emit(&args, &snapshots, || {
                for s in &snapshots {
                    println!(
                        "{:>4}  {}  {}  teams={}",
                        s.id,
                        s.created_at.format("%Y-%m-%d %H:%M"),
                        s.weighting.mode_str(),
                        s.values.len()
                    );
                }
            })
        }
        ["quote", ..] => {
            let snapshot_id = args.id("snapshot")?;
            let season_id = store.get_snapshot(snapshot_id)?.season_id;
            let home = resolve_team(&store, season_id, args.req("home")?)?;
            let away = resolve_team(&store, season_id, args.req("away")?)?;
            let q = store.quote(snapshot_id, home, away)?;
            emit(&args, &q, || {
                println!(
                    "{} ({}): {:.3}  p={:.4}  delta={:+.3}",
                    q.team_name,
                    if q.quote.is_home_team { "home" } else { "away" },
                    q.quote.coefficient,
                    q.quote.implied_probability,
                    q.quote.delta
                )
            })
        }
        _ => {
            eprintln!("{USAGE}");
            Err(anyhow!("unknown command: {}", args.positional.join(" ")))
        }
    }
}

fn emit<T: Serialize>(args: &Args, value: &T, text: impl FnOnce()) -> Result<()> {
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("serialize output")?
        );
    } else {
        text();
    }
    Ok(())
}

fn resolve_team(store: &Store, season_id: i64, query: &str) -> Result<i64> {
    store
        .resolve_team(season_id, query)?
        .map(|t| t.id)
        .ok_or_else(|| anyhow!("no team named {query:?} in season {season_id}"))
}

fn parse_odds(raw: &str) -> Result<(f64, f64, f64)> {
    let parts = raw
        .split([',', ';', ' '])
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .with_context(|| format!("bad odds value {p}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match parts.as_slice() {
        [h, d, a] => Ok((*h, *d, *a)),
        _ => Err(anyhow!("--odds needs three values HOME,DRAW,AWAY, got {raw}")),
    }
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("bad date {raw}: expected RFC 3339 or YYYY-MM-DD"))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("bad date {raw}"))?;
    Ok(midnight.and_utc())
}

fn print_match(m: &Match) {
    let delta = m
        .computed
        .map(|c| format!("{:+.3}", c.delta_home))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "{:>5}  {}  {} v {}  {:.2}/{:.2}/{:.2}  delta_home={}",
        m.id,
        m.date.format("%Y-%m-%d %H:%M"),
        m.home_team_name,
        m.away_team_name,
        m.k_home,
        m.k_draw,
        m.k_away,
        delta
    );
}

fn print_snapshot(s: &StrengthSnapshot) {
    let window = format!(
        "{} .. {}",
        s.from_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "start".to_string()),
        s.to_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "now".to_string())
    );
    println!(
        "snapshot {} season={} window={} weighting={}{}",
        s.id,
        s.season_id,
        window,
        s.weighting.mode_str(),
        s.weighting
            .half_life_days()
            .map(|h| format!(" half_life={h}d"))
            .unwrap_or_default()
    );
    for (rank, v) in s.values.iter().enumerate() {
        println!("{:>3}. {:<28} {:+8.3}", rank + 1, v.team_name, v.strength);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[&str]) -> Args {
        Args::parse(raw.iter().map(|s| s.to_string())).unwrap()
    }

    #[test]
    fn splits_positionals_options_and_json() {
        let args = parse(&["match", "delete", "--id=7", "--json", "--db", "x.sqlite"]);
        assert_eq!(args.positional, vec!["match", "delete"]);
        assert_eq!(args.id("id").unwrap(), 7);
        assert_eq!(args.opt("db"), Some("x.sqlite"));
        assert!(args.json);
        assert!(Args::parse(["--season".to_string()]).is_err());
    }

    #[test]
    fn deletion_has_a_json_shape() {
        let value = serde_json::to_value(Deleted {
            deleted: "match",
            id: 7,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({ "deleted": "match", "id": 7 }));
    }

    #[test]
    fn odds_and_dates_parse_leniently() {
        assert_eq!(parse_odds("1.8, 3.5, 4.5").unwrap(), (1.8, 3.5, 4.5));
        assert!(parse_odds("1.8,3.5").is_err());
        let day = parse_date("2024-08-10").unwrap();
        assert_eq!(day, parse_date("2024-08-10T00:00:00Z").unwrap());
    }
}

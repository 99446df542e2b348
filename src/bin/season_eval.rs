use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};

use oddsline::config::init_tracing;
use oddsline::season_file::SeasonFile;

#[derive(Debug, Default, PartialEq)]
struct EvalArgs {
    path: Option<PathBuf>,
    half_life: Option<f64>,
    now: Option<DateTime<Utc>>,
    pairs: Vec<(String, String)>,
    json: bool,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> anyhow::Result<EvalArgs> {
    let mut out = EvalArgs::default();
    let mut args = raw.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--json" {
            out.json = true;
        } else if let Some(val) = arg.strip_prefix("--half-life=") {
            out.half_life = Some(val.parse().context("--half-life must be a number")?);
        } else if arg == "--half-life" {
            let val = args.next().context("--half-life needs a value")?;
            out.half_life = Some(val.parse().context("--half-life must be a number")?);
        } else if let Some(val) = arg.strip_prefix("--now=") {
            out.now = Some(parse_now(val)?);
        } else if arg == "--now" {
            out.now = Some(parse_now(&args.next().context("--now needs a value")?)?);
        } else if let Some(val) = arg.strip_prefix("--quote=") {
            out.pairs.push(parse_pair(val)?);
        } else if arg == "--quote" {
            out.pairs
                .push(parse_pair(&args.next().context("--quote needs HOME:AWAY")?)?);
        } else if arg.starts_with("--") {
            bail!("unknown option {arg}");
        } else if out.path.is_none() {
            out.path = Some(PathBuf::from(arg));
        } else {
            bail!("unexpected argument {arg}");
        }
    }
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let EvalArgs {
        path,
        half_life,
        now,
        mut pairs,
        json,
    } = parse_args(std::env::args().skip(1))?;

    let path = path.unwrap_or_else(|| PathBuf::from("tests/fixtures/season_small.json"));
    let file = SeasonFile::load(&path)?;
    let eval = file.evaluate(half_life, now.unwrap_or_else(Utc::now))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&eval)?);
        return Ok(());
    }

    println!(
        "{}  base={} flip={}  matches={}",
        file.season,
        eval.calibration.base_coef_home_equal,
        eval.calibration.flip_coef,
        eval.edges.len()
    );
    println!();
    for e in &eval.edges {
        println!(
            "{}  {:<24} v {:<24} base_p={:.4}  delta_home={:+8.3}",
            e.date.format("%Y-%m-%d"),
            e.home,
            e.away,
            e.computed.base_prob_used,
            e.computed.delta_home
        );
    }
    println!();
    for (rank, (name, s)) in eval.strengths.iter().enumerate() {
        println!("{:>3}. {:<28} {:+8.3}", rank + 1, name, s);
    }

    // With no explicit pairs, quote strongest at home to weakest and back.
    if pairs.is_empty()
        && let (Some(top), Some(bottom)) = (eval.strengths.first(), eval.strengths.last())
        && top.0 != bottom.0
    {
        pairs.push((top.0.clone(), bottom.0.clone()));
        pairs.push((bottom.0.clone(), top.0.clone()));
    }
    if !pairs.is_empty() {
        println!();
    }
    for (home, away) in &pairs {
        let q = eval.quote(home, away)?;
        let side = if q.is_home_team { home } else { away };
        println!(
            "{home} v {away}: favourite {side} @ {:.3} (p={:.4})",
            q.coefficient, q.implied_probability
        );
    }

    Ok(())
}

fn parse_now(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("--now must be RFC 3339, got {raw}"))?
        .with_timezone(&Utc))
}

fn parse_pair(raw: &str) -> anyhow::Result<(String, String)> {
    let (home, away) = raw
        .split_once(':')
        .with_context(|| format!("expected HOME:AWAY, got {raw}"))?;
    Ok((home.trim().to_string(), away.trim().to_string()))
}

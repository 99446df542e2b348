use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};

use oddsline::Store;
use oddsline::model::SportKey;
use oddsline::season_file::SeasonFile;
use oddsline::snapshots::SnapshotRequest;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file should be readable")
}

#[test]
fn parses_season_fixture() {
    let file = SeasonFile::parse(&read_fixture("season_small.json")).expect("fixture should parse");
    assert_eq!(file.season, "2024/25");
    assert_eq!(file.teams.len(), 4);
    assert_eq!(file.matches.len(), 6);
    assert_eq!(file.resolve_team("nbfc"), Some(0));
    assert_eq!(file.matches[0].total, Some(2.5));
}

#[test]
fn in_memory_evaluation_ranks_the_favourites() {
    let file = SeasonFile::load(&fixture_path("season_small.json")).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    let eval = file.evaluate(None, now).unwrap();

    assert_eq!(eval.edges.len(), 6);
    // Westmoor Town at home to Northbridge is priced with the away branch.
    assert!(eval.edges[2].computed.delta_home < 0.0);
    assert_eq!(eval.strengths.len(), 4);
    assert_eq!(eval.strengths[0].0, "Northbridge FC");
    assert_eq!(eval.strengths[3].0, "Westmoor Town");
    let sum: f64 = eval.strengths.iter().map(|(_, s)| s).sum();
    assert!(sum.abs() < 1e-6);

    let q = eval.quote("Northbridge", "Westmoor Town").unwrap();
    assert!(q.is_home_team);
    assert!(q.coefficient > 1.0 && q.coefficient < file.base_coef_home_equal);
}

#[test]
fn import_matches_in_memory_evaluation() {
    let file = SeasonFile::load(&fixture_path("season_small.json")).unwrap();
    let mut store = Store::open_in_memory().unwrap();
    let league = store
        .create_league(SportKey::Football, "Fixture League", None)
        .unwrap();
    let summary = file.import_into(&mut store, league.id).unwrap();
    assert_eq!(summary.teams, 4);
    assert_eq!(summary.matches, 6);

    let teams = store.list_teams(summary.season.id).unwrap();
    assert_eq!(teams.len(), 4);
    let stored = store.list_matches(summary.season.id).unwrap();
    assert_eq!(stored.len(), 6);
    assert!(stored.iter().all(|m| m.computed.is_some()));

    let now = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    let snapshot = store
        .create_snapshot_at(
            &SnapshotRequest {
                season_id: summary.season.id,
                ..Default::default()
            },
            now,
        )
        .unwrap();
    let eval = file.evaluate(None, now).unwrap();
    for v in &snapshot.values {
        let expected = eval.strength_of(&v.team_name).unwrap();
        assert!((v.strength - expected).abs() < 1e-6, "{}", v.team_name);
    }

    // a second import of the same season name collides
    assert!(file.import_into(&mut store, league.id).is_err());
}

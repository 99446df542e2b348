use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use oddsline::strength::TeamId;
use oddsline::{
    Calibration, MatchOdds, StrengthMatch, Weighting, compute_edge, estimate_strengths,
};

fn bench_edge_compute(c: &mut Criterion) {
    let cal = Calibration::new(2.40, 1.12).unwrap();
    let home_fav = MatchOdds::new(1.80, 3.50, 4.50).unwrap();
    let away_fav = MatchOdds::new(4.20, 3.60, 1.75).unwrap();
    c.bench_function("edge_compute", |b| {
        b.iter(|| {
            let h = compute_edge(black_box(&home_fav), black_box(&cal)).unwrap();
            let a = compute_edge(black_box(&away_fav), black_box(&cal)).unwrap();
            black_box(h.delta_home + a.delta_home);
        })
    });
}

/// Double round robin: every ordered pairing once, spread over a season.
fn synthetic_season(teams: &[TeamId], rng: &mut StdRng) -> Vec<StrengthMatch> {
    let start = Utc.with_ymd_and_hms(2024, 8, 10, 15, 0, 0).unwrap();
    let mut out = Vec::new();
    for &home in teams {
        for &away in teams {
            if home == away {
                continue;
            }
            out.push(StrengthMatch {
                date: start + Duration::hours(rng.gen_range(0..24 * 280)),
                home_team_id: home,
                away_team_id: away,
                delta_home: rng.gen_range(-25.0..25.0),
            });
        }
    }
    out
}

fn bench_strength_fit(c: &mut Criterion) {
    let teams: Vec<TeamId> = (1..=20).collect();
    let mut rng = StdRng::seed_from_u64(7);
    let matches = synthetic_season(&teams, &mut rng);
    assert_eq!(matches.len(), 380);
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let weighting = Weighting::ExpDecay {
        half_life_days: 60.0,
    };

    c.bench_function("strength_fit_20_teams", |b| {
        b.iter(|| {
            let fit =
                estimate_strengths(black_box(&teams), black_box(&matches), weighting, now).unwrap();
            black_box(fit.ratings.len());
        })
    });
}

criterion_group!(benches, bench_edge_compute, bench_strength_fit);
criterion_main!(benches);

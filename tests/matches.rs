use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ai_referee::anyhow::{self, bail};
use ai_referee::prelude::*;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

struct RefereeOnly;
impl<S> Filter<S> for RefereeOnly {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.target().starts_with("ai_referee") && meta.level() <= &Level::DEBUG
    }
}

fn init_debug_logger() {
    let format = fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .with_test_writer()
            .event_format(format)
            .with_filter(RefereeOnly),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}

/// An executable shell script player.
fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Scripts live under the target directory: temporary directories may be mounted `noexec`.
fn bots_dir() -> tempfile::TempDir {
    tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).expect("bots dir")
}

fn always(dir: &Path, answer: &str) -> PathBuf {
    script(dir, answer, &format!("read line\necho {answer}"))
}

fn rps() -> RockPaperScissors {
    RockPaperScissors::default().with_move_timeout(Duration::from_secs(5))
}

#[test]
fn rock_beats_scissors() {
    init_debug_logger();
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let programs = vec![always(bots.path(), "rock"), always(bots.path(), "scissors")];
    let settings = MatchSettings::new(programs, 0, logs.path());

    let result = run_match(&settings, &mut rps()).unwrap();

    assert_eq!(result.outcome(), Outcome::Win { winner: 0 });
    assert_eq!(result.scores(), &[1.0, 0.0]);
    assert!(logs.path().join("0/0.rock.err").is_file());
    assert!(logs.path().join("0/1.scissors.err").is_file());
}

#[test]
fn seed_is_the_only_argument_and_stderr_is_logged() {
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let chatty = script(
        bots.path(),
        "chatty",
        "echo \"args=$# seed=$1\" >&2\nread line\necho paper",
    );
    let programs = vec![chatty, always(bots.path(), "rock")];
    let settings = MatchSettings::new(programs, 3, logs.path()).with_seeds(vec![11, 22]);

    let result = run_match(&settings, &mut rps()).unwrap();

    assert_eq!(result.winner(), Some(0));
    let log = fs::read_to_string(settings.error_log_path(0).unwrap()).unwrap();
    assert!(log.contains("args=1 seed=11"), "log was: {log}");
}

#[test]
fn missing_program_loses_by_forfeit() {
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let programs = vec![always(bots.path(), "rock"), bots.path().join("nope")];
    let settings = MatchSettings::new(programs, 0, logs.path());

    let result = run_match(&settings, &mut rps()).unwrap();

    assert_eq!(result.winner(), Some(0));
    let log = fs::read_to_string(settings.error_log_path(1).unwrap()).unwrap();
    assert!(log.contains("cannot use/find the program binary"), "log was: {log}");
}

#[test]
fn two_missing_programs_make_an_error() {
    let logs = tempfile::tempdir().unwrap();
    let programs = vec![
        logs.path().join("missing_a"),
        logs.path().join("missing_b"),
    ];
    let settings = MatchSettings::new(programs, 0, logs.path());

    let result = run_match(&settings, &mut rps()).unwrap();

    assert!(result.is_error());
    assert_eq!(result.scores(), &[0.0, 0.0]);
}

#[test]
fn silent_player_is_timed_out_and_killed() {
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let programs = vec![
        always(bots.path(), "rock"),
        script(bots.path(), "sleeper", "exec sleep 30"),
    ];
    let settings = MatchSettings::new(programs, 0, logs.path());
    let mut engine = RockPaperScissors::default().with_move_timeout(Duration::from_secs(1));

    let start = Instant::now();
    let result = run_match(&settings, &mut engine).unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(result.winner(), Some(0));
    assert!(result.description().contains("sleeper forfeits"));
    let log = fs::read_to_string(settings.error_log_path(1).unwrap()).unwrap();
    assert!(log.contains("forfeit"), "log was: {log}");
}

#[test]
fn failing_engine_gives_an_error_result() {
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let programs = vec![always(bots.path(), "rock"), always(bots.path(), "paper")];
    let settings = MatchSettings::new(programs, 0, logs.path());

    let mut failing = |_: &mut [Player<'_>]| -> anyhow::Result<MatchResult> {
        bail!("board is corrupted")
    };
    let result = run_match(&settings, &mut failing).unwrap();
    assert!(result.is_error());
    assert_eq!(result.scores(), &[0.0, 0.0]);
    assert!(result.description().contains("board is corrupted"));

    let mut panicking = |_: &mut [Player<'_>]| -> anyhow::Result<MatchResult> {
        panic!("rules went wrong")
    };
    let result = run_match(&settings, &mut panicking).unwrap();
    assert!(result.is_error());
    assert!(result.description().contains("rules went wrong"));

    let mut short = |players: &mut [Player<'_>]| -> anyhow::Result<MatchResult> {
        Ok(MatchResult::draw(&players[..1], ""))
    };
    let result = run_match(&settings, &mut short).unwrap();
    assert!(result.is_error());
    assert_eq!(result.scores().len(), 2);
}

#[test]
fn engine_sees_players_in_order() {
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let programs: Vec<PathBuf> = ["p0", "p1", "p2"]
        .iter()
        .map(|name| script(bots.path(), name, "exit 0"))
        .collect();
    let settings = MatchSettings::new(programs.clone(), 0, logs.path());

    let mut seen = Vec::new();
    let mut engine = |players: &mut [Player<'_>]| -> anyhow::Result<MatchResult> {
        for player in players.iter() {
            seen.push((player.index(), player.program_name().to_owned()));
        }
        Ok(MatchResult::draw(players, "nothing to play"))
    };
    let result = run_match(&settings, &mut engine).unwrap();

    assert_eq!(result.scores(), &[0.5, 0.5, 0.5]);
    let expected: Vec<(usize, String)> = programs
        .iter()
        .enumerate()
        .map(|(i, p)| (i, p.display().to_string()))
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn series_adds_up_scores() {
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let programs = [always(bots.path(), "paper"), always(bots.path(), "rock")];
    let config = Configuration::new()
        .with_verbose(false)
        .with_logs_dir(logs.path())
        .with_repetitions(3)
        .with_seed(7);

    let mut referee = Referee::new(rps(), config).unwrap();
    let scores = referee.run_series(&programs).unwrap();

    assert_eq!(scores.matches(), 3);
    assert_eq!(scores.totals(), &[3.0, 0.0]);
    for match_id in 0..3 {
        assert!(logs.path().join(match_id.to_string()).is_dir());
    }
    assert!(scores.to_string().contains("has total score 3"));
}

#[test]
fn old_logs_are_removed_unless_kept() {
    let bots = bots_dir();
    let logs = tempfile::tempdir().unwrap();
    let programs = [always(bots.path(), "rock"), always(bots.path(), "rock")];
    let stale = logs.path().join("stale.txt");
    let config = Configuration::new()
        .with_verbose(false)
        .with_logs_dir(logs.path())
        .with_repetitions(1);

    fs::write(&stale, "old").unwrap();
    let mut keeping = Referee::new(rps(), config.clone().with_clean_logs(false)).unwrap();
    let scores = keeping.run_series(&programs).unwrap();
    assert_eq!(scores.totals(), &[0.5, 0.5]);
    assert!(stale.exists());

    let mut cleaning = Referee::new(rps(), config).unwrap();
    cleaning.run_series(&programs).unwrap();
    assert!(!stale.exists());
    assert!(logs.path().join("0").is_dir());
}

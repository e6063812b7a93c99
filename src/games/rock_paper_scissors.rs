//! Two-player rock-paper-scissors over line-based stdin/stdout.
//!
//! Each round:
//! - referee -> player: the opponent's previous move, or `start` in the first round
//! - player -> referee: `rock`, `paper` or `scissors` on one line
//!
//! A player that does not answer within the move timeout, closes its output, or sends
//! anything else forfeits the match. If both forfeit in the same round, the match is an error.

use std::fmt;
use std::io::{BufRead, Read, Write};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context};
use tracing::debug;

use crate::match_result::MatchResult;
use crate::player::Player;
use crate::rules_engine::RulesEngine;

/// Longest line accepted as a move.
const MAX_LINE_LEN: u64 = 64;

/// A rock-paper-scissors move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    #[allow(missing_docs)]
    Rock,
    #[allow(missing_docs)]
    Paper,
    #[allow(missing_docs)]
    Scissors,
}

impl Move {
    /// Whether `self` wins against `other`.
    pub fn beats(self, other: Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors) | (Move::Paper, Move::Rock) | (Move::Scissors, Move::Paper)
        )
    }

    /// The move as sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Move {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Move::Rock, Move::Paper, Move::Scissors]
            .into_iter()
            .find(|m| s.eq_ignore_ascii_case(m.as_str()))
            .ok_or_else(|| anyhow!("invalid move '{}'", s.escape_debug()))
    }
}

/// Rock-paper-scissors rules. The player winning more rounds wins the match.
#[derive(Debug, Clone)]
pub struct RockPaperScissors {
    rounds: usize,
    move_timeout: Duration,
}

impl RockPaperScissors {
    /// A match of `rounds` rounds (at least one), with one second per move.
    pub fn new(rounds: usize) -> Self {
        RockPaperScissors {
            rounds: rounds.max(1),
            ..Self::default()
        }
    }

    /// How long a player may take to answer.
    pub fn with_move_timeout(self, move_timeout: Duration) -> Self {
        RockPaperScissors {
            move_timeout,
            ..self
        }
    }

    fn read_move(&self, player: &mut Player<'_>) -> anyhow::Result<Move> {
        let stream = player.stream();
        stream.set_timeout(Some(self.move_timeout));
        let mut line = String::new();
        let n = Read::take(&mut *stream, MAX_LINE_LEN)
            .read_line(&mut line)
            .context("no move")?;
        if n == 0 {
            bail!("output closed ({})", stream.last_strerror());
        }
        line.trim().parse()
    }
}

impl Default for RockPaperScissors {
    fn default() -> Self {
        RockPaperScissors {
            rounds: 1,
            move_timeout: Duration::from_secs(1),
        }
    }
}

fn send(player: &mut Player<'_>, line: &str) {
    let stream = player.stream();
    let sent = writeln!(stream, "{line}").and_then(|()| stream.flush());
    if let Err(e) = sent {
        debug!(player = player.index(), "could not send to player: {e}");
        player.log(format_args!("could not send '{line}': {e}"));
    }
}

impl RulesEngine for RockPaperScissors {
    fn play(&mut self, players: &mut [Player<'_>]) -> anyhow::Result<MatchResult> {
        ensure!(
            players.len() == 2,
            "rock-paper-scissors needs 2 players, got {}",
            players.len()
        );
        for player in players.iter_mut() {
            player.stream().on_error_raise();
        }

        let mut wins = [0usize; 2];
        let mut history = Vec::with_capacity(self.rounds);
        let mut previous: [Option<Move>; 2] = [None; 2];

        for round in 1..=self.rounds {
            for i in 0..2 {
                let told = previous[1 - i].map_or("start", Move::as_str);
                send(&mut players[i], told);
            }

            let moves = [
                self.read_move(&mut players[0]),
                self.read_move(&mut players[1]),
            ];
            let (first, second) = match moves {
                [Ok(first), Ok(second)] => (first, second),
                [Err(e0), Err(e1)] => {
                    let details = format!("both players forfeit in round {round}: {e0:#}; {e1:#}");
                    return Ok(MatchResult::error(players, details));
                }
                [Err(e), Ok(_)] => {
                    players[0].log(format_args!("forfeit: {e:#}"));
                    let details = format!(
                        "{} forfeits in round {round}: {e:#}",
                        players[0].program_name()
                    );
                    return Ok(MatchResult::win(players, &players[1], details));
                }
                [Ok(_), Err(e)] => {
                    players[1].log(format_args!("forfeit: {e:#}"));
                    let details = format!(
                        "{} forfeits in round {round}: {e:#}",
                        players[1].program_name()
                    );
                    return Ok(MatchResult::win(players, &players[0], details));
                }
            };

            if first.beats(second) {
                wins[0] += 1;
            } else if second.beats(first) {
                wins[1] += 1;
            }
            history.push(format!("{first} vs {second}"));
            previous = [Some(first), Some(second)];
        }

        let details = format!("{} ({}-{})", history.join(", "), wins[0], wins[1]);
        let result = match wins[0].cmp(&wins[1]) {
            std::cmp::Ordering::Greater => MatchResult::win(players, &players[0], details),
            std::cmp::Ordering::Less => MatchResult::win(players, &players[1], details),
            std::cmp::Ordering::Equal => MatchResult::draw(players, details),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::{AsFd, OwnedFd};

    use super::*;
    use crate::match_result::Outcome;

    /// Both pipes of a player, wired in memory instead of to a process.
    struct FakeProcess {
        from_player: (OwnedFd, OwnedFd),
        to_player: (OwnedFd, OwnedFd),
    }

    impl FakeProcess {
        fn new() -> FakeProcess {
            FakeProcess {
                from_player: nix::unistd::pipe().expect("pipe"),
                to_player: nix::unistd::pipe().expect("pipe"),
            }
        }

        fn answer(&self, text: &str) {
            let mut out = File::from(self.from_player.1.try_clone().expect("dup"));
            out.write_all(text.as_bytes()).expect("write");
        }

        fn player(&self, index: usize) -> Player<'_> {
            Player::new(
                self.from_player.0.as_fd(),
                self.to_player.1.as_fd(),
                tempfile::tempfile().expect("tempfile"),
                format!("bot{index}"),
                index,
            )
        }
    }

    fn quick() -> RockPaperScissors {
        RockPaperScissors::default().with_move_timeout(Duration::from_millis(50))
    }

    #[test]
    fn moves_beat_each_other_in_a_cycle() {
        assert!(Move::Rock.beats(Move::Scissors));
        assert!(Move::Scissors.beats(Move::Paper));
        assert!(Move::Paper.beats(Move::Rock));
        assert!(!Move::Rock.beats(Move::Rock));
        assert!(!Move::Rock.beats(Move::Paper));
        assert_eq!("Paper".parse::<Move>().unwrap(), Move::Paper);
        assert!("lizard".parse::<Move>().is_err());
    }

    #[test]
    fn rock_beats_scissors() {
        let (a, b) = (FakeProcess::new(), FakeProcess::new());
        a.answer("rock\n");
        b.answer("scissors\n");
        let mut players = vec![a.player(0), b.player(1)];

        let result = quick().play(&mut players).unwrap();

        assert_eq!(result.outcome(), Outcome::Win { winner: 0 });
        assert_eq!(result.scores(), &[1.0, 0.0]);
        assert!(result.description().contains("rock vs scissors"));
    }

    #[test]
    fn silent_player_forfeits() {
        let (a, b) = (FakeProcess::new(), FakeProcess::new());
        a.answer("paper\n");
        let mut players = vec![a.player(0), b.player(1)];

        let result = quick().play(&mut players).unwrap();

        assert_eq!(result.winner(), Some(0));
        assert!(result.description().contains("bot1 forfeits"));
        assert_eq!(players[1].stream().last_error(), libc::ETIME);
    }

    #[test]
    fn invalid_move_forfeits() {
        let (a, b) = (FakeProcess::new(), FakeProcess::new());
        a.answer("dynamite\n");
        b.answer("rock\n");
        let mut players = vec![a.player(0), b.player(1)];

        let result = quick().play(&mut players).unwrap();

        assert_eq!(result.winner(), Some(1));
        assert!(result.description().contains("dynamite"));
    }

    #[test]
    fn several_rounds_are_counted() {
        let (a, b) = (FakeProcess::new(), FakeProcess::new());
        a.answer("rock\nrock\npaper\n");
        b.answer("paper\nrock\nrock\n");
        let mut players = vec![a.player(0), b.player(1)];

        let result = RockPaperScissors::new(3)
            .with_move_timeout(Duration::from_millis(50))
            .play(&mut players)
            .unwrap();

        assert_eq!(result.outcome(), Outcome::Draw);
        assert_eq!(result.scores(), &[0.5, 0.5]);
        assert!(result.description().ends_with("(1-1)"));
    }

    #[test]
    fn both_forfeiting_is_an_error() {
        let (a, b) = (FakeProcess::new(), FakeProcess::new());
        let mut players = vec![a.player(0), b.player(1)];

        let result = quick().play(&mut players).unwrap();

        assert!(result.is_error());
        assert_eq!(result.scores(), &[0.0, 0.0]);
    }

    #[test]
    fn needs_two_players() {
        let a = FakeProcess::new();
        let mut players = vec![a.player(0)];
        assert!(quick().play(&mut players).is_err());
    }
}

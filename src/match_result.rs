//! Outcome of a single match.

use std::fmt;

use anyhow::{bail, ensure};

use crate::player::Player;

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// One player won.
    Win {
        /// Index of the winner.
        winner: usize,
    },
    /// Nobody won.
    Draw,
    /// The match could not be decided (rules engine failure).
    Error,
}

/// The result of one match: an [`Outcome`], one score per player in `[0, 1]`, and a
/// human-readable description.
///
/// Built through [`win`](Self::win), [`draw`](Self::draw) or [`error`](Self::error) so the
/// score vector always has one entry per player.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    outcome: Outcome,
    scores: Vec<f64>,
    description: String,
}

impl MatchResult {
    /// `winner` scores 1, everyone else 0.
    ///
    /// A `winner` whose index is not a position in `players` gives an
    /// [`Outcome::Error`] result instead.
    pub fn win(players: &[Player<'_>], winner: &Player<'_>, details: impl AsRef<str>) -> Self {
        if winner.index() >= players.len() {
            return Self::error_for(
                players.len(),
                &format!(
                    "winner index {} is out of range for {} players",
                    winner.index(),
                    players.len()
                ),
            );
        }
        let description = with_details(
            format!(
                "{} (player {}) wins",
                winner.program_name(),
                winner.index()
            ),
            details.as_ref(),
        );
        Self::decisive(players.len(), winner.index(), description)
    }

    /// Like [`win`](Self::win) with a custom score vector.
    ///
    /// # Errors
    /// When `winner` is not one of `players`, `scores` does not have one entry per player, an
    /// entry lies outside `[0, 1]`, or the winner does not have the strictly highest score.
    pub fn win_with_scores(
        players: &[Player<'_>],
        winner: &Player<'_>,
        scores: Vec<f64>,
        details: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        ensure!(
            winner.index() < players.len(),
            "winner index {} is out of range for {} players",
            winner.index(),
            players.len()
        );
        let mut result = Self::win(players, winner, details);
        check_scores(&scores, players.len())?;
        let best = scores[winner.index()];
        if scores
            .iter()
            .enumerate()
            .any(|(i, &s)| i != winner.index() && s >= best)
        {
            bail!("winner {} does not have the highest score", winner.index());
        }
        result.scores = scores;
        Ok(result)
    }

    /// Everyone scores 1/2.
    pub fn draw(players: &[Player<'_>], details: impl AsRef<str>) -> Self {
        Self::uniform(
            Outcome::Draw,
            players.len(),
            0.5,
            with_details("Draw".to_owned(), details.as_ref()),
        )
    }

    /// Everyone scores 0: an engine failure is not attributed to any player.
    pub fn error(players: &[Player<'_>], details: impl AsRef<str>) -> Self {
        Self::error_for(players.len(), details.as_ref())
    }

    pub(crate) fn error_for(player_count: usize, details: &str) -> Self {
        Self::uniform(
            Outcome::Error,
            player_count,
            0.0,
            format!("Engine error: {details}"),
        )
    }

    fn decisive(player_count: usize, winner: usize, description: String) -> Self {
        let scores = (0..player_count)
            .map(|i| if i == winner { 1.0 } else { 0.0 })
            .collect();
        MatchResult {
            outcome: Outcome::Win { winner },
            scores,
            description,
        }
    }

    fn uniform(outcome: Outcome, player_count: usize, score: f64, description: String) -> Self {
        MatchResult {
            outcome,
            scores: vec![score; player_count],
            description,
        }
    }

    /// How the match ended.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// One score per player, in player order.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Human-readable summary of the match.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Index of the winner, if the match was won.
    pub fn winner(&self) -> Option<usize> {
        match self.outcome {
            Outcome::Win { winner } => Some(winner),
            _ => None,
        }
    }

    /// True for [`Outcome::Error`].
    pub fn is_error(&self) -> bool {
        self.outcome == Outcome::Error
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

fn with_details(summary: String, details: &str) -> String {
    if details.is_empty() {
        summary
    } else {
        format!("{summary}: {details}")
    }
}

fn check_scores(scores: &[f64], player_count: usize) -> anyhow::Result<()> {
    ensure!(
        scores.len() == player_count,
        "expected {player_count} scores, got {}",
        scores.len()
    );
    if let Some(bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
        bail!("score {bad} is outside [0, 1]");
    }
    Ok(())
}

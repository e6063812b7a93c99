//! The trait a game must implement to be refereed.

use crate::match_result::MatchResult;
use crate::player::Player;

/// Game rules: decides what to exchange with the players and who won.
///
/// The referee spawns every program, then calls [`play`](Self::play) once with one
/// [`Player`] per program, in the order the programs were given.
///
/// No read timeout is preset on the players' streams. An engine that needs bounded waits
/// must call [`PlayerStream::set_timeout`](crate::stream::PlayerStream::set_timeout) itself.
/// A stream reaching end-of-stream without error means the player stopped talking; this is
/// the engine's business (usually a forfeit), not a failure.
///
/// Any closure `FnMut(&mut [Player<'_>]) -> anyhow::Result<MatchResult>` is a rules engine.
pub trait RulesEngine {
    /// Play one match.
    ///
    /// # Error
    /// Returned when the match cannot be decided. The referee turns errors (and panics) into
    /// an [`Outcome::Error`](crate::match_result::Outcome::Error) result.
    fn play(&mut self, players: &mut [Player<'_>]) -> anyhow::Result<MatchResult>;
}

impl<F> RulesEngine for F
where
    F: FnMut(&mut [Player<'_>]) -> anyhow::Result<MatchResult>,
{
    fn play(&mut self, players: &mut [Player<'_>]) -> anyhow::Result<MatchResult> {
        self(players)
    }
}

#[cfg(test)]
mod interface_tests {
    use super::*;

    struct AlwaysDraw {}

    impl RulesEngine for AlwaysDraw {
        fn play(&mut self, players: &mut [Player<'_>]) -> anyhow::Result<MatchResult> {
            Ok(MatchResult::draw(players, "nothing happened"))
        }
    }

    fn play_empty<E: RulesEngine + ?Sized>(engine: &mut E) -> anyhow::Result<MatchResult> {
        engine.play(&mut [])
    }

    #[test]
    fn test_struct_engine() {
        let result = play_empty(&mut AlwaysDraw {}).unwrap();
        assert!(result.scores().is_empty());
        assert!(result.description().contains("nothing happened"));
    }

    #[test]
    fn test_closure_engine() {
        let mut calls = 0;
        let mut engine = |players: &mut [Player<'_>]| -> anyhow::Result<MatchResult> {
            calls += 1;
            Ok(MatchResult::error(players, "closure"))
        };
        assert!(play_empty(&mut engine).unwrap().is_error());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_dyn_engine() {
        let mut engine: Box<dyn RulesEngine> = Box::new(AlwaysDraw {});
        assert!(play_empty(&mut *engine).is_ok());
    }
}

//! Ready-made rules engines.

mod rock_paper_scissors;

pub use rock_paper_scissors::{Move, RockPaperScissors};

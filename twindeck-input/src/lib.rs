//! Line-based command input for twindeck

mod commands;

pub use commands::{parse, Command, DeckId, ParseError, HELP};

//! Command definitions and the line parser for twindeck

use thiserror::Error;

pub use twindeck_audio::DeckId;

/// Commands that can be dispatched from a line of input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Decks
    Load(DeckId, String),
    Play(DeckId),
    /// Stop, keeping the position
    Pause(DeckId),
    /// Stop and return to the start
    Stop(DeckId),
    /// Return to the start without changing play state
    Restart(DeckId),
    SetGain(DeckId, f32),
    SetSpeed(DeckId, f32),
    /// Absolute position in seconds
    Seek(DeckId, f64),
    /// Position as a fraction of the track
    SeekRelative(DeckId, f64),
    SetLoop(DeckId, bool),

    // Playlist
    Add(String),
    Remove(usize),
    List,
    Find(String),
    /// Load a playlist entry into a deck
    Cue(DeckId, usize),

    // App
    Status,
    Help,
    Quit,
}

/// Errors from parsing a command line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid deck '{0}' (expected a or b)")]
    InvalidDeck(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("invalid toggle '{0}' (expected on or off)")]
    InvalidToggle(String),
}

/// One-line summaries for `help`
pub const HELP: &[(&str, &str)] = &[
    ("load <a|b> <path>", "load a file into a deck"),
    ("play <a|b>", "start playback"),
    ("pause <a|b>", "stop, keeping the position"),
    ("stop <a|b>", "stop and return to the start"),
    ("restart <a|b>", "return to the start"),
    ("gain <a|b> <g>", "set gain (0 = mute, 1 = unity)"),
    ("speed <a|b> <r>", "set speed (0.1 to 4.0)"),
    ("seek <a|b> <seconds>", "jump to a time"),
    ("pos <a|b> <fraction>", "jump to a fraction of the track"),
    ("loop <a|b> <on|off>", "restart at the end"),
    ("add <path>", "add a file to the playlist"),
    ("remove <index>", "remove a playlist entry"),
    ("list", "show the playlist"),
    ("find <query>", "search playlist titles"),
    ("cue <a|b> <index>", "load a playlist entry into a deck"),
    ("status", "show both decks"),
    ("help", "show this help"),
    ("quit", "exit"),
];

/// Parse one line of input into a command
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let input = line.trim();
    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };

    if name.is_empty() {
        return Err(ParseError::Empty);
    }

    match name.to_ascii_lowercase().as_str() {
        "load" => {
            let (deck, path) = deck_and_rest(rest)?;
            Ok(Command::Load(deck, path_arg(path)?))
        }
        "play" => Ok(Command::Play(deck_only(rest)?)),
        "pause" => Ok(Command::Pause(deck_only(rest)?)),
        "stop" => Ok(Command::Stop(deck_only(rest)?)),
        "restart" => Ok(Command::Restart(deck_only(rest)?)),
        "gain" => {
            let (deck, value) = deck_and_rest(rest)?;
            Ok(Command::SetGain(deck, number(value, "gain")?))
        }
        "speed" => {
            let (deck, value) = deck_and_rest(rest)?;
            Ok(Command::SetSpeed(deck, number(value, "speed")?))
        }
        "seek" => {
            let (deck, value) = deck_and_rest(rest)?;
            Ok(Command::Seek(deck, number(value, "seconds")?))
        }
        "pos" => {
            let (deck, value) = deck_and_rest(rest)?;
            Ok(Command::SeekRelative(deck, number(value, "fraction")?))
        }
        "loop" => {
            let (deck, value) = deck_and_rest(rest)?;
            Ok(Command::SetLoop(deck, toggle(value)?))
        }
        "add" => Ok(Command::Add(path_arg(rest)?)),
        "remove" => Ok(Command::Remove(number(rest, "index")?)),
        "list" | "ls" => Ok(Command::List),
        "find" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument("query"));
            }
            Ok(Command::Find(rest.to_string()))
        }
        "cue" => {
            let (deck, value) = deck_and_rest(rest)?;
            Ok(Command::Cue(deck, number(value, "index")?))
        }
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        _ => Err(ParseError::UnknownCommand(name.to_string())),
    }
}

fn deck(token: &str) -> Result<DeckId, ParseError> {
    match token.to_ascii_lowercase().as_str() {
        "a" => Ok(DeckId::A),
        "b" => Ok(DeckId::B),
        _ => Err(ParseError::InvalidDeck(token.to_string())),
    }
}

fn deck_only(rest: &str) -> Result<DeckId, ParseError> {
    let (deck, extra) = deck_and_rest(rest)?;
    if !extra.is_empty() {
        tracing::debug!("Ignoring trailing input: {}", extra);
    }
    Ok(deck)
}

/// Split off a leading deck letter, returning it and the trimmed remainder
fn deck_and_rest(rest: &str) -> Result<(DeckId, &str), ParseError> {
    let (token, remainder) = match rest.split_once(char::is_whitespace) {
        Some((token, remainder)) => (token, remainder.trim()),
        None => (rest, ""),
    };
    if token.is_empty() {
        return Err(ParseError::MissingArgument("deck"));
    }
    Ok((deck(token)?, remainder))
}

fn number<T: std::str::FromStr>(value: &str, argument: &'static str) -> Result<T, ParseError> {
    if value.is_empty() {
        return Err(ParseError::MissingArgument(argument));
    }
    value
        .parse()
        .map_err(|_| ParseError::InvalidNumber(value.to_string()))
}

fn toggle(value: &str) -> Result<bool, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "" => Err(ParseError::MissingArgument("on|off")),
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(ParseError::InvalidToggle(value.to_string())),
    }
}

/// Path argument with optional surrounding quotes removed
fn path_arg(value: &str) -> Result<String, ParseError> {
    let path = value.trim();
    let path = if path.len() >= 2
        && ((path.starts_with('\'') && path.ends_with('\''))
            || (path.starts_with('"') && path.ends_with('"')))
    {
        &path[1..path.len() - 1]
    } else {
        path
    };

    if path.is_empty() {
        return Err(ParseError::MissingArgument("path"));
    }
    Ok(path.to_string())
}

//! Track identifiers - plain paths or `file://` URIs

use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";

/// Decode `%XX` escapes. Malformed escapes are kept as-is.
pub fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Filesystem path for an identifier.
///
/// `file://` URIs are stripped of their scheme and unescaped; anything else is
/// taken as a path verbatim.
pub fn identifier_path(identifier: &str) -> PathBuf {
    match identifier.strip_prefix(FILE_SCHEME) {
        Some(rest) => {
            // file://localhost/path is the same as file:///path
            let rest = rest.strip_prefix("localhost").unwrap_or(rest);
            PathBuf::from(percent_decode(rest))
        }
        None => PathBuf::from(identifier),
    }
}

/// Display title for an identifier: its file name with escapes decoded
pub fn display_title(identifier: &str) -> String {
    let raw = identifier.strip_prefix(FILE_SCHEME).unwrap_or(identifier);
    let name = Path::new(raw)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| raw.to_string());
    percent_decode(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("my%20track.mp3"), "my track.mp3");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%4"), "%4");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[test]
    fn test_identifier_path() {
        assert_eq!(identifier_path("/music/a.mp3"), PathBuf::from("/music/a.mp3"));
        assert_eq!(
            identifier_path("file:///music/my%20song.flac"),
            PathBuf::from("/music/my song.flac")
        );
        assert_eq!(
            identifier_path("file://localhost/music/a.wav"),
            PathBuf::from("/music/a.wav")
        );
    }

    #[test]
    fn test_display_title() {
        assert_eq!(display_title("/music/Night%20Drive.mp3"), "Night Drive.mp3");
        assert_eq!(display_title("file:///music/Night%20Drive.mp3"), "Night Drive.mp3");
        assert_eq!(display_title("relative.wav"), "relative.wav");
    }
}

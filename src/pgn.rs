//! PGN rendering for the edited game.

use crate::game::{ChessMove, GameMetadata};

const FALLBACK_FILENAME: &str = "chess_game";

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

/// Tag values are quoted strings: backslash and quote are escaped with a backslash.
fn escape_tag_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders tags, one blank line and the movetext. Total for any input.
pub fn format(metadata: &GameMetadata, moves: &[ChessMove]) -> String {
    let result = or_default(&metadata.result, "*");
    let tags = [
        ("Event", or_default(&metadata.event, "ClickChess Game")),
        ("Site", or_default(&metadata.site, "?")),
        ("Date", or_default(&metadata.date, "????.??.??")),
        ("Round", or_default(&metadata.round, "1")),
        ("White", or_default(&metadata.white, "White")),
        ("Black", or_default(&metadata.black, "Black")),
        ("Result", result),
    ];

    let mut pgn = String::new();
    for (name, value) in tags {
        pgn.push_str(&format!("[{name} \"{}\"]\n", escape_tag_value(value)));
    }
    pgn.push('\n');

    let movetext = moves
        .iter()
        .map(|m| {
            let mut entry = format!("{}. {}", m.move_number, or_default(&m.white, "..."));
            if !m.black.is_empty() {
                entry.push(' ');
                entry.push_str(&m.black);
            }
            entry
        })
        .collect::<Vec<_>>()
        .join(" ");

    if !movetext.is_empty() {
        pgn.push_str(&movetext);
        pgn.push(' ');
    }
    pgn.push_str(result);
    pgn
}

/// `<white player>.pgn` reduced to `[a-z0-9_]`, or `chess_game.pgn`.
pub fn export_filename(metadata: &GameMetadata) -> String {
    let sanitized: String = metadata
        .white
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let stem = sanitized.trim_matches('_');
    format!("{}.pgn", or_default(stem, FALLBACK_FILENAME))
}

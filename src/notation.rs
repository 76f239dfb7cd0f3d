//! Replays the edited moves with `shakmaty` to point the user at the first
//! ply that cannot be played. Purely advisory: nothing here changes moves
//! or blocks export.

use shakmaty::san::SanPlus;
use shakmaty::{Chess, Position};

use crate::game::{ChessMove, Side};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotationIssue {
    pub index: usize,
    pub side: Side,
    pub reason: String,
}

impl std::fmt::Display for NotationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "move {} ({}): {}", self.index + 1, self.side, self.reason)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotationReport {
    /// Plies that replayed legally from the starting position.
    pub verified_plies: usize,
    /// First problem found; replay stops there.
    pub issue: Option<NotationIssue>,
}

impl NotationReport {
    pub fn is_clean(&self) -> bool {
        self.issue.is_none()
    }
}

/// Handwritten castling often uses zeros, and annotations like `!?` are not SAN.
fn normalize_san(text: &str) -> String {
    let stripped = text.trim().trim_end_matches(['!', '?']);
    match stripped.trim_end_matches(['+', '#']) {
        "0-0" => stripped.replacen("0-0", "O-O", 1),
        "0-0-0" => stripped.replacen("0-0-0", "O-O-O", 1),
        _ => stripped.to_string(),
    }
}

pub fn check_moves(moves: &[ChessMove]) -> NotationReport {
    let mut pos = Chess::default();
    let mut report = NotationReport::default();

    let plies: Vec<(usize, Side, &str)> = moves
        .iter()
        .enumerate()
        .flat_map(|(i, m)| [(i, Side::White, m.white.as_str()), (i, Side::Black, m.black.as_str())])
        .collect();
    // A trailing empty Black move just means the game ended on White's move.
    let last_filled = plies.iter().rposition(|(_, _, text)| !text.trim().is_empty());
    let Some(last_filled) = last_filled else {
        return report;
    };

    for &(index, side, text) in &plies[..=last_filled] {
        let issue = |reason: String| NotationIssue { index, side, reason };

        if text.trim().is_empty() {
            report.issue = Some(issue("move is missing".to_string()));
            return report;
        }

        let san: SanPlus = match normalize_san(text).parse() {
            Ok(san) => san,
            Err(_) => {
                report.issue = Some(issue(format!("'{}' is not algebraic notation", text)));
                return report;
            }
        };

        match san.san.to_move(&pos) {
            Ok(mv) => {
                pos.play_unchecked(mv);
                report.verified_plies += 1;
            }
            Err(_) => {
                report.issue = Some(issue(format!("'{}' is not legal in this position", text)));
                return report;
            }
        }
    }
    report
}

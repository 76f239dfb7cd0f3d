//! Move editor transitions.
//! Each operation takes the current list and returns a new one; callers keep
//! whatever they held before untouched.

use crate::error::AppError;
use crate::game::{ChessMove, Side};

/// Replaces the White or Black text of the move at `index`.
pub fn set_field(
    moves: &[ChessMove],
    index: usize,
    side: Side,
    text: &str,
) -> Result<Vec<ChessMove>, AppError> {
    let mut next = moves.to_vec();
    let entry = next.get_mut(index).ok_or(AppError::MoveOutOfRange {
        index,
        len: moves.len(),
    })?;
    let text = text.trim().to_string();
    match side {
        Side::White => entry.white = text,
        Side::Black => entry.black = text,
    }
    Ok(next)
}

/// Adds an empty move numbered after the last one.
pub fn append(moves: &[ChessMove]) -> Vec<ChessMove> {
    let next_number = moves.last().map_or(1, |m| m.move_number.saturating_add(1));
    let mut next = moves.to_vec();
    next.push(ChessMove::new(next_number, "", ""));
    next
}

/// Deletes the move at `index` and renumbers the rest by position, so a
/// spurious OCR row never leaves a gap.
pub fn remove(moves: &[ChessMove], index: usize) -> Result<Vec<ChessMove>, AppError> {
    if index >= moves.len() {
        return Err(AppError::MoveOutOfRange {
            index,
            len: moves.len(),
        });
    }
    Ok(moves
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, m)| m.clone())
        .enumerate()
        .map(|(i, m)| ChessMove {
            move_number: i as u32 + 1,
            ..m
        })
        .collect())
}

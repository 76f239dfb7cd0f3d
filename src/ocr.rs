//! OCR facade: the transcription seam plus the response coercion that turns
//! whatever the model returned into an editable [`ScanResult`].
//! Handwriting OCR is imprecise, so missing fields become empty values
//! instead of errors; only unparseable output fails the scan.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::future::Future;

use crate::error::AppError;
use crate::game::{ChessMove, MetadataPatch, ScanResult};

/// Fixed extraction instruction sent with every image.
pub const INSTRUCTION: &str = "Chess OCR: this image is a handwritten chess scoresheet. \
Extract the White and Black player names, the event and the date if written, and every move \
in order as JSON. Use standard algebraic notation only (e.g. e4, Nf3, O-O, exd5, e8=Q). \
Each moves entry is one move number with White's move and Black's reply; use an empty string \
for a move that is missing or unreadable.";

/// Turns one scoresheet image into structured moves and metadata.
pub trait Transcriber {
    fn transcribe(&self, image_base64: &str) -> impl Future<Output = Result<ScanResult, AppError>>;
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawScan {
    metadata: Option<MetadataPatch>,
    moves: Option<Vec<RawMove>>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawMove {
    #[serde(deserialize_with = "lenient_move_number")]
    move_number: u32,
    white: Option<String>,
    black: Option<String>,
}

/// Accepts `3`, `3.0` or `"3"`; anything else reads as 0.
fn lenient_move_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let number = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().trim_end_matches('.').parse::<u64>().ok(),
        _ => None,
    };
    Ok(number.and_then(|n| u32::try_from(n).ok()).unwrap_or(0))
}

/// Parses model output into a [`ScanResult`]. Empty output is an empty scan.
pub fn parse_scan_response(text: &str) -> Result<ScanResult, AppError> {
    let json = strip_code_fence(text);
    if json.is_empty() {
        return Ok(ScanResult::default());
    }

    let raw: RawScan = serde_json::from_str(json).map_err(|e| {
        AppError::TranscriptionFailed(format!("model returned malformed JSON: {}", e))
    })?;

    let moves = raw
        .moves
        .unwrap_or_default()
        .into_iter()
        .map(|m| ChessMove {
            move_number: m.move_number,
            white: m.white.unwrap_or_default().trim().to_string(),
            black: m.black.unwrap_or_default().trim().to_string(),
        })
        .collect();

    Ok(ScanResult {
        moves,
        metadata: raw.metadata.unwrap_or_default(),
    })
}

/// Drops a surrounding markdown code fence, with or without a language tag.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = inner.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    inner.trim()
}

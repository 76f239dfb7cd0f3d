//! Game record model: move pairs, PGN tag metadata and the transient scan result.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::AppError;

/// PGN result tokens accepted by the Result tag.
pub const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

const DEFAULT_EVENT: &str = "Casual Game";
const PGN_DATE_FORMAT: &str = "%Y.%m.%d";

/// One full move number: White's move and Black's reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChessMove {
    pub move_number: u32,
    pub white: String,
    pub black: String,
}

impl ChessMove {
    pub fn new(move_number: u32, white: impl Into<String>, black: impl Into<String>) -> Self {
        Self {
            move_number,
            white: white.into(),
            black: black.into(),
        }
    }

    pub fn text(&self, side: Side) -> &str {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    White,
    Black,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::White => write!(f, "White"),
            Side::Black => write!(f, "Black"),
        }
    }
}

/// The seven-tag roster. Empty fields fall back to defaults when rendered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameMetadata {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    pub result: String,
}

impl GameMetadata {
    /// Metadata a fresh session starts with.
    pub fn for_new_game(today: NaiveDate) -> Self {
        Self {
            event: DEFAULT_EVENT.to_string(),
            site: String::new(),
            date: today.format(PGN_DATE_FORMAT).to_string(),
            round: "1".to_string(),
            white: String::new(),
            black: String::new(),
            result: "*".to_string(),
        }
    }

    /// Applies a transcription patch. Blank patch fields keep the current value.
    pub fn merge(&mut self, patch: &MetadataPatch) {
        fn apply(target: &mut String, value: &Option<String>) {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = v.to_string();
            }
        }

        apply(&mut self.event, &patch.event);
        apply(&mut self.site, &patch.site);
        apply(&mut self.round, &patch.round);
        apply(&mut self.white, &patch.white);
        apply(&mut self.black, &patch.black);
        if let Some(date) = patch.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            self.date = normalize_date(date);
        }
        if let Some(result) = patch.result.as_deref().map(str::trim) {
            if RESULT_TOKENS.contains(&result) {
                self.result = result.to_string();
            }
        }
        if self.event.is_empty() {
            self.event = DEFAULT_EVENT.to_string();
        }
    }

    pub fn field(&self, field: MetadataField) -> &str {
        match field {
            MetadataField::Event => &self.event,
            MetadataField::Site => &self.site,
            MetadataField::Date => &self.date,
            MetadataField::Round => &self.round,
            MetadataField::White => &self.white,
            MetadataField::Black => &self.black,
            MetadataField::Result => &self.result,
        }
    }

    /// Sets one tag. The Result tag only takes one of [`RESULT_TOKENS`].
    pub fn set_field(&mut self, field: MetadataField, value: &str) -> Result<(), AppError> {
        let value = value.trim();
        let target = match field {
            MetadataField::Event => &mut self.event,
            MetadataField::Site => &mut self.site,
            MetadataField::Date => {
                self.date = if value.is_empty() { String::new() } else { normalize_date(value) };
                return Ok(());
            }
            MetadataField::Round => &mut self.round,
            MetadataField::White => &mut self.white,
            MetadataField::Black => &mut self.black,
            MetadataField::Result => {
                if !RESULT_TOKENS.contains(&value) {
                    return Err(AppError::InvalidResult(value.to_string()));
                }
                &mut self.result
            }
        };
        *target = value.to_string();
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataField {
    Event,
    Site,
    Date,
    Round,
    White,
    Black,
    Result,
}

impl MetadataField {
    pub const ALL: [MetadataField; 7] = [
        MetadataField::White,
        MetadataField::Black,
        MetadataField::Event,
        MetadataField::Site,
        MetadataField::Date,
        MetadataField::Round,
        MetadataField::Result,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetadataField::Event => "Event",
            MetadataField::Site => "Site",
            MetadataField::Date => "Date",
            MetadataField::Round => "Round",
            MetadataField::White => "White player",
            MetadataField::Black => "Black player",
            MetadataField::Result => "Result",
        }
    }
}

/// Partial metadata as read off a scoresheet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataPatch {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub round: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
}

/// Output of one transcription call, merged into the session and discarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub moves: Vec<ChessMove>,
    pub metadata: MetadataPatch,
}

/// Rewrites ISO-like dates to the PGN `YYYY.MM.DD` form; anything else is kept.
pub fn normalize_date(raw: &str) -> String {
    ["%Y-%m-%d", "%Y/%m/%d", PGN_DATE_FORMAT]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .map(|date| date.format(PGN_DATE_FORMAT).to_string())
        .unwrap_or_else(|| raw.to_string())
}

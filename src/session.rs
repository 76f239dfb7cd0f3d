//! Session state: the active screen plus the game being edited.
//! Screens form a small closed state machine; the driver in `app` renders
//! whichever one is active with a single `match`.

use chrono::NaiveDate;

use crate::editor;
use crate::error::AppError;
use crate::game::{ChessMove, GameMetadata, MetadataField, ScanResult, Side};
use crate::pgn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Home,
    Camera,
    Scanning,
    Editing,
    Preview,
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            View::Home => "home",
            View::Camera => "camera",
            View::Scanning => "scanning",
            View::Editing => "editing",
            View::Preview => "preview",
        };
        write!(f, "{}", name)
    }
}

pub struct Session {
    view: View,
    moves: Vec<ChessMove>,
    metadata: GameMetadata,
    error: Option<String>,
    notice: Option<String>,
    scan_enabled: bool,
    today: NaiveDate,
}

impl Session {
    /// `scan_enabled` is false when no usable credential is configured.
    pub fn new(scan_enabled: bool, today: NaiveDate) -> Self {
        Self {
            view: View::Home,
            moves: Vec::new(),
            metadata: GameMetadata::for_new_game(today),
            error: None,
            notice: None,
            scan_enabled,
            today,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn moves(&self) -> &[ChessMove] {
        &self.moves
    }

    pub fn metadata(&self) -> &GameMetadata {
        &self.metadata
    }

    pub fn scan_enabled(&self) -> bool {
        self.scan_enabled
    }

    /// Inline error shown on the home screen.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn report_error(&mut self, err: &AppError) {
        self.error = Some(err.to_string());
    }

    /// Transient, non-blocking message; cleared once read.
    pub fn notify(&mut self, message: impl Into<String>) {
        self.notice = Some(message.into());
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn pgn(&self) -> String {
        pgn::format(&self.metadata, &self.moves)
    }

    fn expect_view(&self, expected: &[View], action: &'static str) -> Result<(), AppError> {
        if expected.contains(&self.view) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition { view: self.view, action })
        }
    }

    fn transition(&mut self, to: View) {
        tracing::debug!("View {} -> {}", self.view, to);
        self.view = to;
    }

    pub fn open_camera(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Home], "open the scanner")?;
        if !self.scan_enabled {
            return Err(AppError::MissingCredential);
        }
        self.error = None;
        self.transition(View::Camera);
        Ok(())
    }

    pub fn cancel_capture(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Camera], "cancel capture")?;
        self.transition(View::Home);
        Ok(())
    }

    /// Enters the exclusive scanning state; a scan already in flight blocks another.
    pub fn begin_scan(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Home, View::Camera], "start a scan")?;
        if !self.scan_enabled {
            return Err(AppError::MissingCredential);
        }
        self.error = None;
        self.transition(View::Scanning);
        Ok(())
    }

    /// Success replaces the moves and merges metadata; failure returns home
    /// with the message and discards the scan.
    pub fn finish_scan(&mut self, outcome: Result<ScanResult, AppError>) -> Result<(), AppError> {
        self.expect_view(&[View::Scanning], "finish a scan")?;
        match outcome {
            Ok(scan) => {
                self.moves = scan.moves;
                self.metadata.merge(&scan.metadata);
                self.transition(View::Editing);
            }
            Err(err) => {
                tracing::warn!("Scan failed: {}", err);
                self.error = Some(err.to_string());
                self.transition(View::Home);
            }
        }
        Ok(())
    }

    pub fn preview(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Editing], "preview")?;
        self.transition(View::Preview);
        Ok(())
    }

    pub fn edit(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Preview], "edit moves")?;
        self.transition(View::Editing);
        Ok(())
    }

    /// Back to home from the editor; the game stays loaded.
    pub fn leave_editor(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Editing], "leave the editor")?;
        self.transition(View::Home);
        Ok(())
    }

    pub fn start_over(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Preview], "start a new scan")?;
        self.moves.clear();
        self.metadata = GameMetadata::for_new_game(self.today);
        self.error = None;
        self.transition(View::Home);
        Ok(())
    }

    pub fn set_move_text(&mut self, index: usize, side: Side, text: &str) -> Result<(), AppError> {
        self.expect_view(&[View::Editing], "edit a move")?;
        self.moves = editor::set_field(&self.moves, index, side, text)?;
        Ok(())
    }

    pub fn append_move(&mut self) -> Result<(), AppError> {
        self.expect_view(&[View::Editing], "add a move")?;
        self.moves = editor::append(&self.moves);
        Ok(())
    }

    pub fn remove_move(&mut self, index: usize) -> Result<(), AppError> {
        self.expect_view(&[View::Editing], "remove a move")?;
        self.moves = editor::remove(&self.moves, index)?;
        Ok(())
    }

    pub fn set_metadata(&mut self, field: MetadataField, value: &str) -> Result<(), AppError> {
        self.expect_view(&[View::Editing], "edit game details")?;
        self.metadata.set_field(field, value)
    }
}

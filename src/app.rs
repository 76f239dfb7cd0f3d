//! Interactive driver. Owns the [`Session`] and renders the active screen
//! each loop iteration with `dialoguer` prompts.

use anyhow::{Result, bail};
use chrono::NaiveDate;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;
use std::time::Duration;

use crate::capture::{self, LiveCapture, ScreenSource};
use crate::config::Config;
use crate::error::AppError;
use crate::export::Exporter;
use crate::game::{MetadataField, RESULT_TOKENS, ScanResult, Side};
use crate::notation::{self, NotationReport};
use crate::ocr::Transcriber;
use crate::session::{Session, View};

const SCAN_MESSAGES: [&str; 4] = [
    "Analyzing Image",
    "Reading Handwriting",
    "Verifying Notation",
    "Finalizing Moves",
];
const SCAN_MESSAGE_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeAction {
    OpenScanner,
    PickFile,
    Quit,
}

impl HomeAction {
    fn label(self) -> &'static str {
        match self {
            HomeAction::OpenScanner => "Open scanner",
            HomeAction::PickFile => "Pick image file",
            HomeAction::Quit => "Quit",
        }
    }
}

/// Scan entries are hidden while no credential is configured.
pub fn home_actions(session: &Session) -> Vec<HomeAction> {
    if session.scan_enabled() {
        vec![HomeAction::OpenScanner, HomeAction::PickFile, HomeAction::Quit]
    } else {
        vec![HomeAction::Quit]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditAction {
    EditMove,
    AddMove,
    RemoveMove,
    EditDetails,
    Preview,
    Back,
}

impl EditAction {
    fn label(self) -> &'static str {
        match self {
            EditAction::EditMove => "Edit a move",
            EditAction::AddMove => "Add move",
            EditAction::RemoveMove => "Remove a move",
            EditAction::EditDetails => "Edit players and game details",
            EditAction::Preview => "Preview PGN",
            EditAction::Back => "Back to home",
        }
    }
}

pub fn edit_actions(session: &Session) -> Vec<EditAction> {
    let mut actions = Vec::new();
    if !session.moves().is_empty() {
        actions.push(EditAction::EditMove);
    }
    actions.push(EditAction::AddMove);
    if !session.moves().is_empty() {
        actions.push(EditAction::RemoveMove);
    }
    actions.extend([EditAction::EditDetails, EditAction::Preview, EditAction::Back]);
    actions
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewAction {
    WhatsApp,
    Save,
    Copy,
    Share,
    Edit,
    StartNew,
    Quit,
}

impl PreviewAction {
    pub const ALL: [PreviewAction; 7] = [
        PreviewAction::WhatsApp,
        PreviewAction::Save,
        PreviewAction::Copy,
        PreviewAction::Share,
        PreviewAction::Edit,
        PreviewAction::StartNew,
        PreviewAction::Quit,
    ];

    fn label(self) -> &'static str {
        match self {
            PreviewAction::WhatsApp => "Share via WhatsApp",
            PreviewAction::Save => "Save PGN",
            PreviewAction::Copy => "Copy",
            PreviewAction::Share => "Share...",
            PreviewAction::Edit => "Edit moves",
            PreviewAction::StartNew => "Start new scan",
            PreviewAction::Quit => "Quit",
        }
    }
}

/// Runs one transcription for the image and settles the scanning state.
/// Status messages rotate while the request is in flight.
pub async fn run_scan<T: Transcriber>(
    session: &mut Session,
    transcriber: Option<&T>,
    image: Option<String>,
) -> Result<(), AppError> {
    let outcome = match (transcriber, image) {
        (None, _) => Err(AppError::MissingCredential),
        (Some(_), None) => Err(AppError::TranscriptionFailed("no image was captured".to_string())),
        (Some(transcriber), Some(image)) => transcribe_with_status(transcriber, &image).await,
    };
    session.finish_scan(outcome)
}

async fn transcribe_with_status<T: Transcriber>(
    transcriber: &T,
    image: &str,
) -> Result<ScanResult, AppError> {
    eprintln!("Processing scoresheet...");
    let transcription = transcriber.transcribe(image);
    tokio::pin!(transcription);

    let mut ticker = tokio::time::interval(SCAN_MESSAGE_INTERVAL);
    let mut step = 0;
    loop {
        tokio::select! {
            outcome = &mut transcription => return outcome,
            _ = ticker.tick() => {
                eprintln!("  {}...", SCAN_MESSAGES[step % SCAN_MESSAGES.len()]);
                step += 1;
            }
        }
    }
}

/// One status line under the move list, or nothing for an empty game.
fn notation_summary(report: &NotationReport) -> Option<String> {
    match &report.issue {
        Some(issue) => Some(format!("⚠ Check {}", issue)),
        None if report.verified_plies > 0 => Some(format!("✔ {} plies replay legally", report.verified_plies)),
        None => None,
    }
}

/// Terminals wrap dragged-in paths in quotes.
fn clean_path_input(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'')
}

pub struct App<T: Transcriber> {
    session: Session,
    transcriber: Option<T>,
    exporter: Exporter,
    config: Config,
    pending_image: Option<String>,
    theme: ColorfulTheme,
}

impl<T: Transcriber> App<T> {
    pub fn new(config: Config, transcriber: Option<T>, today: NaiveDate) -> Self {
        let session = Session::new(transcriber.is_some(), today);
        let exporter = Exporter::new(config.output_dir.clone(), config.share_command.clone());
        Self {
            session,
            transcriber,
            exporter,
            config,
            pending_image: None,
            theme: ColorfulTheme::default(),
        }
    }

    /// Queues a picked file for scanning. Unreadable files stay on home with an inline error.
    pub fn pick_file(&mut self, path: &Path) {
        match capture::load_image_file(path).and_then(|image| {
            self.session.begin_scan()?;
            Ok(image)
        }) {
            Ok(image) => self.pending_image = Some(image),
            Err(err) => self.session.report_error(&err),
        }
    }

    /// Non-interactive mode: scan one file and return its PGN.
    pub async fn scan_to_pgn(&mut self, path: &Path) -> Result<String> {
        self.pick_file(path);
        if self.session.view() == View::Scanning {
            run_scan(&mut self.session, self.transcriber.as_ref(), self.pending_image.take()).await?;
        }
        match (self.session.view(), self.session.error()) {
            (View::Editing, _) => Ok(self.session.pgn()),
            (_, Some(err)) => bail!("{}", err),
            (view, None) => bail!("Scan did not complete (stopped on the {} screen)", view),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.session.view() {
                View::Home => {
                    if !self.render_home()? {
                        return Ok(());
                    }
                }
                View::Camera => self.render_camera()?,
                View::Scanning => {
                    let image = self.pending_image.take();
                    run_scan(&mut self.session, self.transcriber.as_ref(), image).await?;
                }
                View::Editing => self.render_editing()?,
                View::Preview => {
                    if !self.render_preview()? {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn show_notice(&mut self) {
        if let Some(notice) = self.session.take_notice() {
            println!("» {}", notice);
        }
    }

    /// Returns false when the user quits.
    fn render_home(&mut self) -> Result<bool> {
        println!();
        println!("ClickChess - scan your scoresheets to PGN in seconds.");
        if !self.session.scan_enabled() {
            println!("⚠ {}", AppError::MissingCredential);
        }
        if let Some(err) = self.session.error() {
            println!("✖ {}", err);
        }
        self.show_notice();

        let actions = home_actions(&self.session);
        let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();
        let choice = Select::with_theme(&self.theme)
            .with_prompt("What next?")
            .items(&labels)
            .default(0)
            .interact()?;

        match actions[choice] {
            HomeAction::OpenScanner => {
                if let Err(err) = self.session.open_camera() {
                    self.session.report_error(&err);
                }
            }
            HomeAction::PickFile => {
                let raw: String = Input::with_theme(&self.theme)
                    .with_prompt("Image file")
                    .interact_text()?;
                self.pick_file(Path::new(clean_path_input(&raw)));
            }
            HomeAction::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn render_camera(&mut self) -> Result<()> {
        println!();
        println!("Align the scoresheet on screen {}.", self.config.monitor_index);

        let source = match ScreenSource::open(self.config.monitor_index, self.config.capture_region) {
            Ok(source) => source,
            Err(err) => {
                println!("✖ {}", err);
                Select::with_theme(&self.theme).items(&["Go back"]).default(0).interact()?;
                self.session.cancel_capture()?;
                return Ok(());
            }
        };
        let mut live = LiveCapture::new(source);

        let choice = Select::with_theme(&self.theme)
            .with_prompt("Ready?")
            .items(&["Capture", "Cancel"])
            .default(0)
            .interact()?;
        if choice == 1 {
            live.cancel();
            self.session.cancel_capture()?;
            return Ok(());
        }

        match live.capture() {
            Ok(image) => {
                self.session.begin_scan()?;
                self.pending_image = Some(image);
            }
            Err(err) => {
                println!("✖ {}", err);
                let retry = Select::with_theme(&self.theme)
                    .items(&["Try again", "Go back"])
                    .default(0)
                    .interact()?;
                if retry == 1 {
                    self.session.cancel_capture()?;
                }
            }
        }
        Ok(())
    }

    fn print_game(&self) {
        let meta = self.session.metadata();
        println!();
        println!("Verify Moves");
        println!(
            "White: {}   Black: {}   Event: {}   Date: {}   Result: {}",
            meta.white, meta.black, meta.event, meta.date, meta.result
        );
        if self.session.moves().is_empty() {
            println!("  No moves found");
        }
        for m in self.session.moves() {
            println!("  {:>3}. {:<10} {}", m.move_number, m.white, m.black);
        }
        if let Some(line) = notation_summary(&notation::check_moves(self.session.moves())) {
            println!("{}", line);
        }
    }

    fn render_editing(&mut self) -> Result<()> {
        self.print_game();
        self.show_notice();

        let actions = edit_actions(&self.session);
        let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();
        let choice = Select::with_theme(&self.theme)
            .with_prompt("Edit")
            .items(&labels)
            .default(0)
            .interact()?;

        let outcome = match actions[choice] {
            EditAction::EditMove => self.edit_move()?,
            EditAction::AddMove => self.session.append_move(),
            EditAction::RemoveMove => self.remove_move()?,
            EditAction::EditDetails => self.edit_details()?,
            EditAction::Preview => self.session.preview(),
            EditAction::Back => self.session.leave_editor(),
        };
        if let Err(err) = outcome {
            self.session.notify(err.to_string());
        }
        Ok(())
    }

    fn pick_move(&self, prompt: &str) -> Result<usize> {
        let items: Vec<String> = self
            .session
            .moves()
            .iter()
            .map(|m| format!("{}. {} {}", m.move_number, m.white, m.black))
            .collect();
        Ok(Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(&items)
            .default(0)
            .interact()?)
    }

    fn edit_move(&mut self) -> Result<Result<(), AppError>> {
        let index = self.pick_move("Which move?")?;
        let side = match Select::with_theme(&self.theme)
            .items(&["White", "Black"])
            .default(0)
            .interact()?
        {
            0 => Side::White,
            _ => Side::Black,
        };
        let current = self
            .session
            .moves()
            .get(index)
            .map(|m| m.text(side).to_string())
            .unwrap_or_default();
        let text: String = Input::with_theme(&self.theme)
            .with_prompt(side.to_string())
            .with_initial_text(current)
            .allow_empty(true)
            .interact_text()?;
        Ok(self.session.set_move_text(index, side, &text))
    }

    fn remove_move(&mut self) -> Result<Result<(), AppError>> {
        let index = self.pick_move("Remove which move?")?;
        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt("Remove it and renumber the rest?")
            .default(true)
            .interact()?;
        if !confirmed {
            return Ok(Ok(()));
        }
        Ok(self.session.remove_move(index))
    }

    fn edit_details(&mut self) -> Result<Result<(), AppError>> {
        let meta = self.session.metadata();
        let items: Vec<String> = MetadataField::ALL
            .iter()
            .map(|f| format!("{}: {}", f.label(), meta.field(*f)))
            .collect();
        let choice = Select::with_theme(&self.theme)
            .with_prompt("Which detail?")
            .items(&items)
            .default(0)
            .interact()?;
        let field = MetadataField::ALL[choice];

        let value = if field == MetadataField::Result {
            let current = RESULT_TOKENS
                .iter()
                .position(|t| *t == self.session.metadata().result)
                .unwrap_or(RESULT_TOKENS.len() - 1);
            let picked = Select::with_theme(&self.theme)
                .with_prompt("Result")
                .items(&RESULT_TOKENS)
                .default(current)
                .interact()?;
            RESULT_TOKENS[picked].to_string()
        } else {
            Input::with_theme(&self.theme)
                .with_prompt(field.label())
                .with_initial_text(self.session.metadata().field(field).to_string())
                .allow_empty(true)
                .interact_text()?
        };
        Ok(self.session.set_metadata(field, &value))
    }

    /// Returns false when the user quits.
    fn render_preview(&mut self) -> Result<bool> {
        let pgn = self.session.pgn();
        println!();
        println!("Export PGN");
        println!("{}", pgn);
        println!();
        self.show_notice();

        let labels: Vec<&str> = PreviewAction::ALL.iter().map(|a| a.label()).collect();
        let choice = Select::with_theme(&self.theme)
            .with_prompt("Export")
            .items(&labels)
            .default(0)
            .interact()?;

        match PreviewAction::ALL[choice] {
            PreviewAction::WhatsApp => {
                let link = self.exporter.whatsapp(self.session.metadata(), &pgn);
                if let Some(url) = &link.url {
                    println!("{}", url);
                }
                let notice = match (&link.opened, &link.copied) {
                    (Ok(()), _) => "Opened WhatsApp".to_string(),
                    (Err(err), Ok(())) => format!("{} (PGN copied to clipboard)", err),
                    (Err(err), Err(_)) => err.to_string(),
                };
                self.session.notify(notice);
            }
            PreviewAction::Save => {
                let notice = match self.exporter.save(self.session.metadata(), &pgn) {
                    Ok(path) => format!("Saved {}", path.display()),
                    Err(err) => err.to_string(),
                };
                self.session.notify(notice);
            }
            PreviewAction::Copy => {
                let notice = match self.exporter.copy(&pgn) {
                    Ok(()) => "Copied to clipboard!".to_string(),
                    Err(err) => err.to_string(),
                };
                self.session.notify(notice);
            }
            PreviewAction::Share => {
                let notice = match self.exporter.share(&pgn) {
                    Ok(()) => "Shared".to_string(),
                    Err(err) => err.to_string(),
                };
                self.session.notify(notice);
            }
            PreviewAction::Edit => self.session.edit()?,
            PreviewAction::StartNew => self.session.start_over()?,
            PreviewAction::Quit => return Ok(false),
        }
        Ok(true)
    }
}

//! Export and share targets for the finished PGN.
//! Every action returns its failure to the caller, which shows it as a
//! notice; none of them end the session.

use arboard::Clipboard;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Url;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::AppError;
use crate::game::GameMetadata;
use crate::pgn;

const WHATSAPP_URL: &str = "https://wa.me/";

/// Characters `encodeURIComponent` leaves alone; everything else is escaped, spaces as `%20`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Outcome of the messaging share. Copying and opening fail independently.
#[derive(Debug)]
pub struct ShareLink {
    pub url: Option<Url>,
    pub opened: Result<(), AppError>,
    pub copied: Result<(), AppError>,
}

pub struct Exporter {
    output_dir: PathBuf,
    share_command: Option<String>,
    // Kept alive: on X11/Wayland the copied text disappears with its owner.
    clipboard: Option<Clipboard>,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>, share_command: Option<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            share_command,
            clipboard: None,
        }
    }

    /// Writes the PGN next to earlier exports without overwriting any of them.
    pub fn save(&self, metadata: &GameMetadata, pgn_text: &str) -> Result<PathBuf, AppError> {
        let save_failed = |e: std::io::Error| AppError::ShareUnsupported(format!("Could not save PGN: {}", e));

        std::fs::create_dir_all(&self.output_dir).map_err(save_failed)?;
        let path = unique_path(&self.output_dir, &pgn::export_filename(metadata));
        let mut body = pgn_text.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        std::fs::write(&path, body).map_err(save_failed)?;
        tracing::info!("Saved PGN to {}", path.display());
        Ok(path)
    }

    pub fn copy(&mut self, pgn_text: &str) -> Result<(), AppError> {
        let unsupported = |e: arboard::Error| AppError::ShareUnsupported(format!("Clipboard unavailable: {}", e));

        if self.clipboard.is_none() {
            self.clipboard = Some(Clipboard::new().map_err(unsupported)?);
        }
        match self.clipboard.as_mut() {
            Some(clipboard) => clipboard.set_text(pgn_text).map_err(unsupported),
            None => Err(AppError::ShareUnsupported("Clipboard unavailable".to_string())),
        }
    }

    /// Copies the PGN (best effort) and opens a WhatsApp link carrying it.
    pub fn whatsapp(&mut self, metadata: &GameMetadata, pgn_text: &str) -> ShareLink {
        let copied = self.copy(pgn_text);
        let (url, opened) = match whatsapp_link(metadata, pgn_text) {
            Ok(url) => {
                let opened = open_url(&url);
                (Some(url), opened)
            }
            Err(e) => (None, Err(e)),
        };
        if let Err(e) = &opened {
            tracing::warn!("{}", e);
        }
        ShareLink { url, opened, copied }
    }

    /// Hands the PGN to the configured share helper on stdin.
    pub fn share(&self, pgn_text: &str) -> Result<(), AppError> {
        let command = self.share_command.as_deref().ok_or_else(|| {
            AppError::ShareUnsupported(
                "Sharing not supported: no share command configured (set CLICKCHESS_SHARE_COMMAND)".to_string(),
            )
        })?;
        pipe_to_command(command, pgn_text)
    }
}

/// `https://wa.me/?text=...` with a header line followed by the full PGN.
pub fn whatsapp_link(metadata: &GameMetadata, pgn_text: &str) -> Result<Url, AppError> {
    let white = if metadata.white.is_empty() { "White" } else { &metadata.white };
    let black = if metadata.black.is_empty() { "Black" } else { &metadata.black };
    let text = format!("*Chess Game PGN:* {} vs {}\n\n{}", white, black, pgn_text);

    let link = format!("{}?text={}", WHATSAPP_URL, utf8_percent_encode(&text, URI_COMPONENT));
    Url::parse(&link).map_err(|e| AppError::ShareUnsupported(format!("Could not build share link: {}", e)))
}

fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let stem = filename.strip_suffix(".pgn").unwrap_or(filename);
    (2..)
        .map(|n| dir.join(format!("{}_{}.pgn", stem, n)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

fn open_url(url: &Url) -> Result<(), AppError> {
    let (program, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![url.as_str()])
    } else if cfg!(target_os = "windows") {
        ("cmd", vec!["/C", "start", "", url.as_str()])
    } else {
        ("xdg-open", vec![url.as_str()])
    };

    let status = Command::new(program)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| AppError::ShareUnsupported(format!("Could not launch {}: {}", program, e)))?;
    if !status.success() {
        return Err(AppError::ShareUnsupported(format!("{} exited with {}", program, status)));
    }
    Ok(())
}

fn pipe_to_command(command_line: &str, input: &str) -> Result<(), AppError> {
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| AppError::ShareUnsupported("Sharing not supported: share command is empty".to_string()))?;
    let unsupported = |e: std::io::Error| AppError::ShareUnsupported(format!("Could not run {}: {}", program, e));

    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .map_err(unsupported)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).map_err(unsupported)?;
    }
    let status = child.wait().map_err(unsupported)?;
    if !status.success() {
        return Err(AppError::ShareUnsupported(format!("{} exited with {}", program, status)));
    }
    Ok(())
}

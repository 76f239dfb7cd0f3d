use crate::session::View;

/// Failures surfaced to the user. None of these end the session.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("OPENAI_API_KEY not detected. Add it to your environment or .env file to enable scanning.")]
    MissingCredential,

    #[error("Could not access capture device: {0}")]
    CameraUnavailable(String),

    #[error("Failed to process the uploaded image format: {0}")]
    InvalidImageFormat(String),

    #[error("Failed to scan scoresheet: {0}")]
    TranscriptionFailed(String),

    #[error("{0}")]
    ShareUnsupported(String),

    #[error("Cannot {action} from the {view} screen")]
    InvalidTransition { view: View, action: &'static str },

    #[error("Move {index} does not exist (game has {len} moves)")]
    MoveOutOfRange { index: usize, len: usize },

    #[error("Invalid result '{0}': expected 1-0, 0-1, 1/2-1/2 or *")]
    InvalidResult(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        let err = AppError::TranscriptionFailed("timeout".to_string());
        assert_eq!(err.to_string(), "Failed to scan scoresheet: timeout");

        let err = AppError::InvalidTransition { view: View::Home, action: "preview" };
        assert_eq!(err.to_string(), "Cannot preview from the home screen");

        let err = AppError::MoveOutOfRange { index: 4, len: 2 };
        assert!(err.to_string().contains("2 moves"));
    }
}

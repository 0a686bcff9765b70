use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a `CardError`.
///
/// The retry orchestrator decides on this tag alone, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContentIncomplete,
    Unparseable,
    NetworkOrTimeout,
    Provider,
    RenderFailure,
    RetryExhausted,
}

/// Library-level error type shared by every stage of the card pipeline.
#[derive(Debug, Clone, Error)]
pub enum CardError {
    #[error("Content incomplete: {reason}")]
    ContentIncomplete { reason: String },

    #[error("Unparseable model output: {detail}")]
    Unparseable { detail: String },

    #[error("Network error or timeout: {0}")]
    NetworkOrTimeout(String),

    #[error("Provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Render failure: {0}")]
    RenderFailure(String),

    #[error("Generation failed after {attempts} attempts: {last_reason}")]
    RetryExhausted { attempts: u32, last_reason: String },
}

impl CardError {
    pub fn incomplete(reason: impl Into<String>) -> Self {
        CardError::ContentIncomplete {
            reason: reason.into(),
        }
    }

    pub fn unparseable(detail: impl Into<String>) -> Self {
        CardError::Unparseable {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CardError::ContentIncomplete { .. } => ErrorKind::ContentIncomplete,
            CardError::Unparseable { .. } => ErrorKind::Unparseable,
            CardError::NetworkOrTimeout(_) => ErrorKind::NetworkOrTimeout,
            CardError::Provider { .. } => ErrorKind::Provider,
            CardError::RenderFailure(_) => ErrorKind::RenderFailure,
            CardError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
        }
    }

    /// True for failures a fresh generation attempt may cure.
    ///
    /// Unparseable output is retried too: the raw cause is ambiguous and often transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkOrTimeout | ErrorKind::ContentIncomplete | ErrorKind::Unparseable
        )
    }

    /// The single consolidated message shown to the end user.
    ///
    /// Intermediate retry reasons are never surfaced except inside the exhausted message.
    pub fn user_message(&self) -> String {
        match self {
            CardError::RetryExhausted {
                attempts,
                last_reason,
            } => format!(
                "Content generation failed after {attempts} attempts, please try again later. ({last_reason})"
            ),
            CardError::Provider { status, message } => {
                format!("The content service rejected the request ({status}): {message}")
            }
            CardError::RenderFailure(msg) => format!("Image export failed: {msg}"),
            other => format!("Content generation failed: {other}"),
        }
    }
}

impl From<reqwest::Error> for CardError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status.as_u16() == 429 || status.is_server_error() {
                return CardError::NetworkOrTimeout(e.to_string());
            }
            return CardError::Provider {
                status: status.as_u16(),
                message: e.to_string(),
            };
        }
        if e.is_decode() {
            return CardError::unparseable(format!("response body could not be decoded: {e}"));
        }
        CardError::NetworkOrTimeout(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(CardError::incomplete("short").is_retryable());
        assert!(CardError::unparseable("garbage").is_retryable());
        assert!(CardError::NetworkOrTimeout("reset".to_string()).is_retryable());
    }

    #[test]
    fn test_terminal_kinds() {
        let provider = CardError::Provider {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(!provider.is_retryable());
        assert!(!CardError::RenderFailure("canvas".to_string()).is_retryable());
        let exhausted = CardError::RetryExhausted {
            attempts: 4,
            last_reason: "x".to_string(),
        };
        assert!(!exhausted.is_retryable());
        assert_eq!(exhausted.kind(), ErrorKind::RetryExhausted);
    }

    #[test]
    fn test_user_message_carries_last_reason() {
        let err = CardError::RetryExhausted {
            attempts: 4,
            last_reason: "Content incomplete: too short".to_string(),
        };
        let msg = err.user_message();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("too short"));
    }
}

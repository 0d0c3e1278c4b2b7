/// Why a BotFather step failed.
///
/// Returned as a value from every orchestrator operation; callers decide
/// whether to re-run the whole operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("timed out waiting for BotFather ({step})")]
    Timeout { step: String },

    #[error("unexpected response, expected {expected}: {excerpt}")]
    UnexpectedResponse { expected: String, excerpt: String },

    #[error("could not parse response: {0}")]
    ParseFailure(String),

    #[error("button not found: {0}")]
    ButtonNotFound(String),

    #[error("button click failed: {0}")]
    ClickFailed(String),

    #[error("username is already taken: {0}")]
    UsernameTaken(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl StepError {
    pub(crate) fn timeout(step: impl Into<String>) -> Self {
        Self::Timeout { step: step.into() }
    }

    pub(crate) fn unexpected(expected: impl Into<String>, text: &str) -> Self {
        Self::UnexpectedResponse {
            expected: expected.into(),
            excerpt: excerpt(text),
        }
    }
}

impl From<crate::channel::TransportError> for StepError {
    fn from(e: crate::channel::TransportError) -> Self {
        Self::Transport(e.0)
    }
}

pub type StepResult<T> = std::result::Result<T, StepError>;

/// First 200 chars of a reply, for error messages.
pub(crate) fn excerpt(text: &str) -> String {
    const MAX: usize = 200;
    let mut out: String = text.chars().take(MAX).collect();
    if text.chars().count() > MAX {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_is_char_safe() {
        let long = "é".repeat(300);
        let e = excerpt(&long);
        assert_eq!(e.chars().count(), 201);
        assert!(e.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }
}

//! Application error type.
//!
//! Every failure in the pipeline is surfaced as an [`AppError`] carrying the
//! process exit code the binary should return:
//!
//! - `2`: invalid input or configuration (bad edges, unreadable files, CLI misuse)
//! - `3`: insufficient data (empty collections, bins without counts)
//! - `4`: numerical failure (non-convergence, non-finite statistic)
//! - `5`: rendering or terminal failure

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message with additional context, keeping the exit code.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        Self {
            exit_code: self.exit_code,
            message: format!("{context}: {}", self.message),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_exit_code() {
        let err = AppError::new(3, "empty").context("dataset HESS-1");
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "dataset HESS-1: empty");
    }
}

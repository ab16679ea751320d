//! Application error type.
//!
//! Every fallible stage returns `Result<_, AppError>`. The exit code travels with
//! the message so `main` can terminate the run with a meaningful status:
//!
//! - `2`: bad invocation, configuration, or I/O on inputs/outputs
//! - `3`: not enough data to run a stage (e.g. fewer than two RV epochs)
//! - `4`: malformed upstream data or a numerical failure that cannot be accepted

/// Exit code for invalid input, configuration, and file-system problems.
pub const EXIT_INPUT: u8 = 2;
/// Exit code for stages that were handed too little data.
pub const EXIT_INSUFFICIENT: u8 = 3;
/// Exit code for malformed data and unrecoverable numerical failures.
pub const EXIT_DATA: u8 = 4;

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

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(EXIT_INSUFFICIENT, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(EXIT_DATA, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
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

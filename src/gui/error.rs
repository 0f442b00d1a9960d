use std::{error::Error, fmt::Display, thread::JoinHandle};

/// Anything that can stop a terminal screen.
#[derive(Debug)]
pub enum GuiError {
    /// The terminal failed
    IOError(std::io::Error),
    /// A pipeline thread panicked
    JoinError,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal error: {}", e),
            Self::JoinError => write!(f, "a worker thread panicked"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

/// Wait for a worker thread, turning a panic into [GuiError::JoinError].
pub fn join_worker<T>(handle: JoinHandle<T>) -> Result<T, GuiError> {
    handle.join().map_err(|_| GuiError::JoinError)
}

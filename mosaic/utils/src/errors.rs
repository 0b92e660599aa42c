//! Errors generated by the compiler.

use thiserror::Error;

/// Standard result type used by fallible operations in the compiler.
pub type MosaicResult<T> = Result<T, Error>;

/// Errors generated while synthesizing hardware modules. Construction
/// failures propagate outward and abort the surrounding generation; there
/// is no partial recovery.
#[derive(Error, Debug)]
pub enum Error {
    /// The input schedule or group metadata violates a structural
    /// assumption, e.g. a buffering policy names a level with no tile.
    #[error("malformed structure: {0}")]
    MalformedStructure(String),

    /// A tree cursor was asked to move somewhere that does not exist.
    #[error("invalid navigation: {0}")]
    InvalidNavigation(String),

    /// An analysis could not decide a required property and the caller
    /// cannot proceed with an assumed answer.
    #[error("indeterminate analysis result: {0}")]
    Indeterminate(String),

    /// The design description could not be understood.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors with no better classification.
    #[error("{0}")]
    Misc(String),
}

impl Error {
    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Error::MalformedStructure(msg.to_string())
    }

    pub fn invalid_navigation<S: ToString>(msg: S) -> Self {
        Error::InvalidNavigation(msg.to_string())
    }

    pub fn indeterminate<S: ToString>(msg: S) -> Self {
        Error::Indeterminate(msg.to_string())
    }

    pub fn invalid_input<S: ToString>(msg: S) -> Self {
        Error::InvalidInput(msg.to_string())
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Error::Misc(msg.to_string())
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: String,
        expected: String,
        found: String,
    },

    #[error("{modes} Fourier modes requested but an input of length {n} only has {limit}")]
    ModeOverflow { modes: usize, n: usize, limit: usize },

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Non-finite values in {0}")]
    NonFinite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape<E: std::fmt::Debug, F: std::fmt::Debug>(
        what: &str,
        expected: E,
        found: F,
    ) -> Self {
        Error::ShapeMismatch {
            what: what.to_string(),
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        }
    }
}

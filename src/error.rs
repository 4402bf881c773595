//! Crate error type.
use std::{fmt, io, num, path::PathBuf, result};
use tch::TchError;

/// Crate specific result type.
pub type Result<T> = result::Result<T, self::Error>;

/// All possible errors returned by this library.
#[derive(Debug)]
pub enum Error {
    /// Configuration cannot describe a run.
    Config(String),

    /// Parsing or writing delimited text failed.
    Csv(csv::Error),

    /// Dataset produced no sequences.
    EmptyDataset(PathBuf),

    /// Prediction requested from an observation without any steps.
    EmptyObservation,

    /// Formatting text output failed.
    Fmt(fmt::Error),

    /// Error reading or writing a file.
    Io(io::Error),

    /// Observed and target segments disagree on the pedestrians.
    Misaligned {
        /// Pedestrians in the observed segment.
        observed: usize,

        /// Pedestrians in the target segment.
        target: usize,
    },

    /// Results file has no header row.
    MissingHeader(PathBuf),

    /// Flat data does not fill the stated shape.
    Shape {
        /// Number of values the shape requires.
        expected: usize,

        /// Number of values supplied.
        found: usize,
    },

    /// PyTorch exception.
    Tch(TchError),

    /// Integer type conversion failed.
    TryFromInt(num::TryFromIntError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(what) => write!(f, "invalid configuration: {}", what),
            Self::Csv(err) => write!(f, "csv: {}", err),
            Self::EmptyDataset(dir) => write!(f, "no sequences in {}", dir.display()),
            Self::EmptyObservation => write!(f, "observed batch has no steps"),
            Self::Fmt(err) => write!(f, "format: {}", err),
            Self::Io(err) => write!(f, "io: {}", err),
            Self::Misaligned { observed, target } => write!(
                f,
                "observed segment has {} pedestrians, target has {}",
                observed, target
            ),
            Self::MissingHeader(path) => write!(f, "no header row in {}", path.display()),
            Self::Shape { expected, found } => {
                write!(f, "expected {} values, found {}", expected, found)
            }
            Self::Tch(err) => write!(f, "torch: {}", err),
            Self::TryFromInt(err) => write!(f, "integer conversion: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Self::Csv(error)
    }
}

impl From<fmt::Error> for Error {
    fn from(error: fmt::Error) -> Self {
        Self::Fmt(error)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<TchError> for Error {
    fn from(error: TchError) -> Self {
        Self::Tch(error)
    }
}

impl From<num::TryFromIntError> for Error {
    fn from(error: num::TryFromIntError) -> Self {
        Self::TryFromInt(error)
    }
}

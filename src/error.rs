use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use machine_learning::MlErr;
use ndarray::ShapeError;

/// The result type used across the whole crate.
pub type Result<T> = std::result::Result<T, WganErr>;

/// Every failure a training run can surface to its driver.
///
/// Running out of batches is not part of this enum, the data source reports it through
/// `Fetch::EndOfEpoch` since it ends an epoch and not the run.
#[derive(Debug)]
pub enum WganErr {
    /// An invalid hyperparameter, caught before anything is built.
    Config(String),
    /// A checkpoint or image could not be persisted, even after retrying.
    ArtifactWrite {
        path: PathBuf,
        attempts: usize,
        source: io::Error,
    },
    /// A loss stopped being a finite number.
    NumericalDivergence {
        step: u64,
        what: &'static str,
        value: f32,
    },
    Checkpoint(String),
    Dataset(String),
    Ml(MlErr),
    Shape(ShapeError),
    Io(io::Error),
}

impl Display for WganErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WganErr::Config(msg) => write!(f, "invalid config: {msg}"),
            WganErr::ArtifactWrite {
                path,
                attempts,
                source,
            } => write!(
                f,
                "failed to write {} after {attempts} attempt(s): {source}",
                path.display()
            ),
            WganErr::NumericalDivergence { step, what, value } => {
                write!(f, "numerical divergence at step {step}: {what} is {value}")
            }
            WganErr::Checkpoint(msg) => write!(f, "invalid checkpoint: {msg}"),
            WganErr::Dataset(msg) => write!(f, "invalid dataset: {msg}"),
            WganErr::Ml(e) => write!(f, "model error: {e}"),
            WganErr::Shape(e) => write!(f, "shape error: {e}"),
            WganErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for WganErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WganErr::ArtifactWrite { source, .. } => Some(source),
            WganErr::Ml(e) => Some(e),
            WganErr::Shape(e) => Some(e),
            WganErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for WganErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<ShapeError> for WganErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<io::Error> for WganErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

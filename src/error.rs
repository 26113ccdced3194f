use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used across the whole crate.
pub type Result<T> = std::result::Result<T, DictErr>;

/// Broad classification of a `DictErr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrKind {
    /// Raised before any computation, the engine's configuration is unusable.
    Config,
    /// The batch handed to a single call is unusable.
    Input,
    /// A solve or an update produced an invalid numerical state.
    Numerical,
}

/// The dictionary learning error type.
#[derive(Debug)]
pub enum DictErr {
    InvalidParam {
        name: &'static str,
        reason: String,
    },
    UnknownVariant {
        what: &'static str,
        got: String,
    },
    SealedParam(&'static str),
    DictInitShape {
        got: (usize, usize),
        expected: (usize, usize),
    },
    ThreadPool(rayon::ThreadPoolBuildError),
    Json(serde_json::Error),
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    NonFiniteInput {
        row: usize,
        col: usize,
    },
    SampleOutOfBounds {
        index: usize,
        n_samples: usize,
    },
    NotFitted,
    NotPositiveDefinite {
        pivot: usize,
        value: f64,
    },
    NonFinite(&'static str),
}

impl DictErr {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrKind {
        match self {
            DictErr::InvalidParam { .. }
            | DictErr::UnknownVariant { .. }
            | DictErr::SealedParam(_)
            | DictErr::DictInitShape { .. }
            | DictErr::ThreadPool(_)
            | DictErr::Json(_) => ErrKind::Config,
            DictErr::SizeMismatch { .. }
            | DictErr::NonFiniteInput { .. }
            | DictErr::SampleOutOfBounds { .. }
            | DictErr::NotFitted => ErrKind::Input,
            DictErr::NotPositiveDefinite { .. } | DictErr::NonFinite(_) => ErrKind::Numerical,
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        DictErr::InvalidParam {
            name,
            reason: reason.into(),
        }
    }
}

impl Display for DictErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictErr::InvalidParam { name, reason } => {
                write!(f, "invalid value for `{name}`: {reason}")
            }
            DictErr::UnknownVariant { what, got } => write!(f, "unknown {what} `{got}`"),
            DictErr::SealedParam(name) => {
                write!(f, "`{name}` cannot be changed once the engine is initialized")
            }
            DictErr::DictInitShape { got, expected } => write!(
                f,
                "initial dictionary and input shape mismatch: got {got:?}, expected {expected:?}"
            ),
            DictErr::ThreadPool(e) => write!(f, "failed to build the thread pool: {e}"),
            DictErr::Json(e) => write!(f, "malformed configuration: {e}"),
            DictErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for {what}: got {got}, expected {expected}"
            ),
            DictErr::NonFiniteInput { row, col } => {
                write!(f, "non-finite value in the input at ({row}, {col})")
            }
            DictErr::SampleOutOfBounds { index, n_samples } => write!(
                f,
                "sample index {index} is out of bounds for {n_samples} declared samples"
            ),
            DictErr::NotFitted => f.write_str("the engine has not been fitted yet"),
            DictErr::NotPositiveDefinite { pivot, value } => write!(
                f,
                "gram matrix is not positive definite: pivot {pivot} has value {value:e}"
            ),
            DictErr::NonFinite(what) => write!(f, "non-finite values appeared in the {what}"),
        }
    }
}

impl Error for DictErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DictErr::ThreadPool(e) => Some(e),
            DictErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for DictErr {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(value)
    }
}

impl From<serde_json::Error> for DictErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

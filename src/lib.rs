pub mod config;
pub mod dictionary;
mod engine;
pub mod error;
pub mod initialization;
pub mod projection;
pub mod sampling;
pub mod solver;
pub mod statistics;
mod storage;

pub use config::{ConfigDelta, DictFactConfig, DictReduction, Solver, SubsetSampling, Weights};
pub use engine::{Callback, DictFact, Snapshot};
pub use error::{DictErr, ErrKind, Result};
pub use projection::RADIUS;

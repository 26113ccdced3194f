use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{DictErr, Result};

/// How the code of a sample is inferred from the observed feature subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    /// Gram matrix restricted to the observed subset.
    Masked,
    /// Full gram matrix of the dictionary, whatever the subset.
    #[default]
    Gram,
    /// Running average of the subset gram matrices.
    Average,
}

/// How the learning rate of the sufficient statistics decays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weights {
    /// A single rate driven by the global step count.
    #[default]
    Sync,
    /// Per-feature rates driven by how often each feature has been observed.
    Async,
}

/// How the feature subset of a mini-batch is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsetSampling {
    /// Uniformly at random without replacement.
    #[default]
    Random,
    /// Contiguous blocks of features, rotating through the whole feature set.
    Cyclic,
}

/// Which features the dictionary update touches.
///
/// Serialized as `"follow"`, `"same"` or a bare factor, which may also be written as a string.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "DictReductionRepr", into = "DictReductionRepr")]
pub enum DictReduction {
    /// The same subset the codes were computed on.
    #[default]
    Follow,
    /// An independent subset with the same reduction factor.
    Same,
    /// An independent subset with its own reduction factor.
    Factor(f64),
}

macro_rules! named_variants {
    ($ty:ty, $what:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = DictErr;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($variant),)+
                    _ => Err(DictErr::UnknownVariant {
                        what: $what,
                        got: s.to_string(),
                    }),
                }
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($variant => $name,)+
                };

                f.write_str(name)
            }
        }
    };
}

named_variants!(Solver, "solver", {
    Solver::Masked => "masked",
    Solver::Gram => "gram",
    Solver::Average => "average",
});

named_variants!(Weights, "weights", {
    Weights::Sync => "sync",
    Weights::Async => "async",
});

named_variants!(SubsetSampling, "subset sampling", {
    SubsetSampling::Random => "random",
    SubsetSampling::Cyclic => "cyclic",
});

impl FromStr for DictReduction {
    type Err = DictErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "follow" => Ok(Self::Follow),
            "same" => Ok(Self::Same),
            other => other
                .parse::<f64>()
                .map(Self::Factor)
                .map_err(|_| DictErr::UnknownVariant {
                    what: "dictionary reduction",
                    got: other.to_string(),
                }),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DictReductionRepr {
    Factor(f64),
    Name(String),
}

impl TryFrom<DictReductionRepr> for DictReduction {
    type Error = DictErr;

    fn try_from(repr: DictReductionRepr) -> Result<Self> {
        match repr {
            DictReductionRepr::Factor(factor) => Ok(Self::Factor(factor)),
            DictReductionRepr::Name(name) => name.parse(),
        }
    }
}

impl From<DictReduction> for DictReductionRepr {
    fn from(reduction: DictReduction) -> Self {
        match reduction {
            DictReduction::Follow => Self::Name("follow".to_string()),
            DictReduction::Same => Self::Name("same".to_string()),
            DictReduction::Factor(factor) => Self::Factor(factor),
        }
    }
}

impl DictReduction {
    /// Resolves the reduction factor of the dictionary subset.
    ///
    /// # Returns
    /// `None` when the dictionary update follows the code subset.
    pub fn factor(&self, reduction: f64) -> Option<f64> {
        match *self {
            DictReduction::Follow => None,
            DictReduction::Same => Some(reduction),
            DictReduction::Factor(factor) => Some(factor),
        }
    }
}

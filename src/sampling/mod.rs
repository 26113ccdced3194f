mod subset;

pub use subset::{SubsetSampler, subset_len};

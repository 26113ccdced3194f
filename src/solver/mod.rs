mod code;
mod linalg;

pub use code::CodeSolver;
pub use linalg::{Cholesky, condition_diagonal, coordinate_descent, gram_matrix};

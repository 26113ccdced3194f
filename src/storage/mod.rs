mod rows;

pub use rows::RowStore;
